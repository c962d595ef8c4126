//! Two-stage compiler from the indicator language to a context-driven script.
//!
//! Stage 1 (`pine-parser` + `pine-codegen`) lowers indicator source to a
//! plain script. Stage 2 (this crate) parses that script, analyzes it and
//! rewrites it so all persistent state goes through the context `$`. Input
//! without a `//@version` pragma is taken to be a script already and skips
//! Stage 1.

pub mod analysis;
pub mod declaration;
pub mod error;
pub mod scope;
pub mod transform;
pub mod version;

pub use declaration::{DeclValue, DeclarationKind, ScriptDeclaration};
pub use error::{CompileError, ErrorKind, TransformError};
pub use version::{MIN_VERSION, VersionError};

use pine_estree::{parse_script, print_expr};
use tracing::{debug, debug_span, info};

/// Which front end a source goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// Decided by the presence of a version pragma
    #[default]
    Auto,
    /// Indicator source; a pragma is required
    Pine,
    /// Already a script; Stage 1 is skipped
    Script,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Log the compiled listing at debug level
    pub debug: bool,
    /// Number the lines of the logged listing
    pub include_line_numbers: bool,
    pub language: Language,
    /// Reject sources whose pragma names another version
    pub expected_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUnit {
    /// `($) => { ... }`
    pub code: String,
    /// Stage-1 output, when Stage 1 ran
    pub stage1: Option<String>,
    pub version: Option<u32>,
    pub declaration: Option<ScriptDeclaration>,
}

impl CompiledUnit {
    /// The generated code, optionally with right-aligned line numbers.
    pub fn listing(&self, line_numbers: bool) -> String {
        if !line_numbers {
            return self.code.clone();
        }
        let width = self.code.lines().count().to_string().len();
        self.code
            .lines()
            .enumerate()
            .map(|(index, line)| format!("{:>width$} | {}\n", index + 1, line, width = width))
            .collect()
    }
}

/// Compile one unit of source.
pub fn compile(source: &str, options: &CompileOptions) -> Result<CompiledUnit, CompileError> {
    let version = {
        let _span = debug_span!("pipeline.version").entered();
        match options.language {
            Language::Script => None,
            Language::Auto | Language::Pine => {
                let pragmas = version::scan_pragmas(source)
                    .map_err(|e| TransformError::new("version", "pragma", e.to_string()))?;
                version::resolve_version(&pragmas, options.expected_version)?
            }
        }
    };

    let run_stage1 = match options.language {
        Language::Pine if version.is_none() => return Err(VersionError::Missing.into()),
        Language::Pine => true,
        Language::Script => false,
        Language::Auto => version.is_some(),
    };

    let stage1 = if run_stage1 {
        let _span = debug_span!("pipeline.stage1").entered();
        let program = pine_parser::parse_source(source)?;
        let lowered = pine_codegen::generate(&program);
        debug!(bytes = lowered.len(), "stage 1 complete");
        Some(lowered)
    } else {
        None
    };

    let script = {
        let _span = debug_span!("pipeline.parse").entered();
        match (parse_script(stage1.as_deref().unwrap_or(source)), &stage1) {
            (Ok(script), _) => script,
            // Stage 1 must always produce a parseable script
            (Err(err), Some(_)) => {
                return Err(TransformError::new("stage1", "output", err.to_string()).into());
            }
            (Err(err), None) => return Err(err.into()),
        }
    };

    let analysis = {
        let _span = debug_span!("pipeline.analysis").entered();
        match (analysis::analyze(script), &stage1) {
            (Ok(analysis), _) => analysis,
            (Err(CompileError::Entry(message)), Some(_)) => {
                return Err(TransformError::new("stage1", "entry", message).into());
            }
            (Err(err), _) => return Err(err),
        }
    };
    let declaration = declaration::extract(&analysis.body);

    let unit = {
        let _span = debug_span!("pipeline.transform").entered();
        transform::transform(analysis.body, analysis.scopes)?
    };

    let code = {
        let _span = debug_span!("pipeline.print").entered();
        print_expr(&unit)
    };

    let compiled = CompiledUnit {
        code,
        stage1,
        version,
        declaration,
    };
    if options.debug {
        debug!(
            listing = %compiled.listing(options.include_line_numbers),
            "compiled unit"
        );
    }
    info!(
        version = ?compiled.version,
        stage1 = compiled.stage1.is_some(),
        bytes = compiled.code.len(),
        "compiled"
    );
    Ok(compiled)
}
