//! `//@version=N` pragma detection
//!
//! The pragma decides whether the source is indicator-language text that
//! needs Stage 1, or an already-lowered script that goes straight to the
//! context transformer.

use regex::Regex;
use thiserror::Error;

/// Oldest language version the front end accepts
pub const MIN_VERSION: u32 = 5;

const PRAGMA_PATTERN: &str = r"(?m)^[ \t]*//[ \t]*@version[ \t]*=[ \t]*(\d+)[ \t]*\r?$";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("missing `//@version=N` pragma")]
    Missing,
    #[error("unsupported version {found} on line {line} (minimum is {minimum})")]
    Unsupported {
        found: String,
        line: usize,
        minimum: u32,
    },
    #[error("version mismatch: expected {expected}, found {found} on line {line}")]
    Mismatch {
        expected: u32,
        found: u32,
        line: usize,
    },
    #[error("conflicting version pragmas: {first} and {second} on line {line}")]
    Conflict {
        first: u32,
        second: u32,
        line: usize,
    },
}

impl VersionError {
    /// Line of the offending pragma
    pub fn line(&self) -> Option<usize> {
        match self {
            VersionError::Missing => None,
            VersionError::Unsupported { line, .. }
            | VersionError::Mismatch { line, .. }
            | VersionError::Conflict { line, .. } => Some(*line),
        }
    }
}

/// A pragma as written, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pragma {
    pub digits: String,
    /// 1-indexed
    pub line: usize,
}

/// Every pragma in the source, in order.
pub fn scan_pragmas(source: &str) -> Result<Vec<Pragma>, regex::Error> {
    let pattern = Regex::new(PRAGMA_PATTERN)?;
    Ok(pattern
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let digits = caps.get(1)?.as_str().to_string();
            let line = source[..whole.start()].matches('\n').count() + 1;
            Some(Pragma { digits, line })
        })
        .collect())
}

/// Validate the pragmas found in a source.
///
/// Returns `Ok(None)` when there is no pragma; callers decide whether that
/// is acceptable.
pub fn resolve_version(
    pragmas: &[Pragma],
    expected: Option<u32>,
) -> Result<Option<u32>, VersionError> {
    let mut resolved: Option<u32> = None;

    for pragma in pragmas {
        let version = pragma
            .digits
            .parse::<u32>()
            .ok()
            .filter(|v| *v >= MIN_VERSION)
            .ok_or_else(|| VersionError::Unsupported {
                found: pragma.digits.clone(),
                line: pragma.line,
                minimum: MIN_VERSION,
            })?;

        match resolved {
            Some(first) if first != version => {
                return Err(VersionError::Conflict {
                    first,
                    second: version,
                    line: pragma.line,
                });
            }
            Some(_) => {}
            None => {
                if let Some(expected) = expected
                    && expected != version
                {
                    return Err(VersionError::Mismatch {
                        expected,
                        found: version,
                        line: pragma.line,
                    });
                }
                resolved = Some(version);
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn detect(source: &str, expected: Option<u32>) -> Result<Option<u32>, VersionError> {
        resolve_version(&scan_pragmas(source).unwrap(), expected)
    }

    #[test]
    fn test_pragma_forms() {
        assert_eq!(detect("//@version=5\nx = 1\n", None), Ok(Some(5)));
        assert_eq!(detect("  // @version = 6  \n", None), Ok(Some(6)));
        assert_eq!(detect("//@version=5\r\nx = 1\r\n", None), Ok(Some(5)));
        assert_eq!(detect("x = 1\n", None), Ok(None));
        // Not a line of its own
        assert_eq!(detect("x = 1 //@version=5\n", None), Ok(None));
    }

    #[test]
    fn test_pragma_line_is_reported() {
        let pragmas = scan_pragmas("// title\n\n//@version=5\n").unwrap();
        assert_eq!(pragmas.len(), 1);
        assert_eq!(pragmas[0].line, 3);
    }

    #[test]
    fn test_old_versions_are_rejected() {
        let err = detect("//@version=4\n", None).unwrap_err();
        assert_eq!(
            err,
            VersionError::Unsupported {
                found: "4".into(),
                line: 1,
                minimum: MIN_VERSION
            }
        );
        assert_eq!(err.line(), Some(1));

        let err = detect("//@version=99999999999\n", None).unwrap_err();
        assert!(matches!(err, VersionError::Unsupported { .. }));
    }

    #[test]
    fn test_expected_version_mismatch() {
        assert_eq!(detect("//@version=5\n", Some(5)), Ok(Some(5)));
        assert_eq!(
            detect("//@version=5\n", Some(6)),
            Err(VersionError::Mismatch {
                expected: 6,
                found: 5,
                line: 1
            })
        );
    }

    #[test]
    fn test_conflicting_pragmas() {
        assert_eq!(detect("//@version=5\n//@version=5\n", None), Ok(Some(5)));
        assert_eq!(
            detect("//@version=5\nx = 1\n//@version=6\n", None),
            Err(VersionError::Conflict {
                first: 5,
                second: 6,
                line: 3
            })
        );
    }
}
