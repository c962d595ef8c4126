/// Error formatting utilities for compiler diagnostics
///
/// Turns positioned errors into human-readable messages with:
/// - Line and column numbers
/// - Source code context
/// - Visual caret pointing to the error location

/// Convert byte offset to (line, column), both 1-indexed
pub fn byte_to_line_col(source: &str, byte_offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    let mut pos = 0;

    for ch in source.chars() {
        if pos >= byte_offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
        pos += ch.len_utf8();
    }

    (line, col)
}

/// Source context block: the offending line and a caret under `column`
fn context_block(source: &str, line: usize, column: usize) -> String {
    let source_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");
    format!(
        "   |\n{:3} | {}\n   | {}^",
        line,
        source_line,
        " ".repeat(column.saturating_sub(1))
    )
}

/// Format an error message with source context
pub fn format_error_with_context(message: &str, source: &str, line: usize, column: usize) -> String {
    format!(
        "{}\n  --> line {}:{}\n{}",
        message,
        line,
        column,
        context_block(source, line, column)
    )
}

/// Format a complete compiler error with filename header (Rust-style)
///
/// `location` is the 1-indexed (line, column) when the error has one.
pub fn format_compile_error(
    filename: &str,
    message: &str,
    source: &str,
    location: Option<(usize, usize)>,
) -> String {
    match location {
        Some((line, column)) => format!(
            "error: Failed to compile `{}`\n\nerror: {}\n  --> {}:{}:{}\n{}\n",
            filename,
            message,
            filename,
            line,
            column,
            context_block(source, line, column)
        ),
        None => format!(
            "error: Failed to compile `{}`\n\nerror: {}\n",
            filename, message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_to_line_col_first_line() {
        let source = "hello world";
        assert_eq!(byte_to_line_col(source, 0), (1, 1));
        assert_eq!(byte_to_line_col(source, 6), (1, 7));
    }

    #[test]
    fn test_byte_to_line_col_multiline() {
        let source = "line1\nline2\nline3";
        assert_eq!(byte_to_line_col(source, 0), (1, 1));
        assert_eq!(byte_to_line_col(source, 6), (2, 1));
        assert_eq!(byte_to_line_col(source, 12), (3, 1));
    }

    #[test]
    fn test_format_error_with_context() {
        let source = "x = 1\ny = (2 + 3]\n";
        let result = format_error_with_context("expected `)`", source, 2, 11);
        assert!(result.contains("line 2:11"));
        assert!(result.contains("y = (2 + 3]"));
        assert!(result.ends_with(&format!("{}^", " ".repeat(10))));
    }

    #[test]
    fn test_format_compile_error_without_location() {
        let result = format_compile_error("demo.pine", "unsupported version 3", "", None);
        assert_eq!(
            result,
            "error: Failed to compile `demo.pine`\n\nerror: unsupported version 3\n"
        );
    }
}
