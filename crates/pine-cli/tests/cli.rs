#![allow(clippy::unwrap_used, clippy::panic)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const DEMO: &str = r#"//@version=5
indicator("Demo")
var float counter = 0
counter := counter + 1
fast = ta.ema(close, 9)
plot(fast)
"#;

fn pinec(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pinec"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn write_source(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_compiles_to_stdout() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "demo.pine", DEMO);

    let output = pinec(&["demo.pine"], dir.path());
    assert!(output.status.success(), "pinec failed:\n{}", stderr(&output));
    let code = stdout(&output);
    assert!(code.starts_with("($) => {\n"), "{}", code);
    assert!(code.contains("    $.let.glb1_fast = $.init($.let.glb1_fast, ta.ema(p0, p1, \"_ta0\"));\n"));
    assert!(code.ends_with("}\n"));
}

#[test]
fn test_output_file_and_line_numbers() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "demo.pine", DEMO);

    let output = pinec(&["demo.pine", "--line-numbers", "-o", "demo.js"], dir.path());
    assert!(output.status.success(), "pinec failed:\n{}", stderr(&output));
    assert!(stdout(&output).is_empty());

    let listing = fs::read_to_string(dir.path().join("demo.js")).unwrap();
    let mut lines = listing.lines();
    assert_eq!(lines.next(), Some(" 1 | ($) => {"));
    assert!(listing.lines().any(|line| line.starts_with("10 | ")));
}

#[test]
fn test_emit_stage1() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "demo.pine", DEMO);

    let output = pinec(&["demo.pine", "--emit-stage1"], dir.path());
    assert!(output.status.success(), "pinec failed:\n{}", stderr(&output));
    let script = stdout(&output);
    assert!(script.starts_with("(context) => {\n"), "{}", script);
    assert!(script.contains("    var counter = 0;\n"));

    // A script has nothing to show for Stage 1
    write_source(&dir, "plain.js", "(context) => {\n    let x = 1;\n}\n");
    let output = pinec(&["plain.js", "--emit-stage1"], dir.path());
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_emit_tokens_and_ast() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "tiny.pine", "//@version=5\nx = 1\n");

    let output = pinec(&["tiny.pine", "--emit-tokens"], dir.path());
    assert!(output.status.success(), "pinec failed:\n{}", stderr(&output));
    let tokens = stdout(&output);
    assert!(tokens.lines().any(|line| line == "2:1 Ident(\"x\")"), "{}", tokens);
    assert!(tokens.lines().any(|line| line.ends_with(" Eof")));

    let output = pinec(&["tiny.pine", "--emit-ast"], dir.path());
    assert!(output.status.success(), "pinec failed:\n{}", stderr(&output));
    assert!(stdout(&output).contains("Program"));
}

#[test]
fn test_script_input() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "plain.js", "(context) => {\n    let x = 10;\n}\n");

    let output = pinec(&["plain.js", "--script"], dir.path());
    assert!(output.status.success(), "pinec failed:\n{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "($) => {\n    $.let.glb1_x = $.init($.let.glb1_x, 10);\n}\n"
    );
}

#[test]
fn test_rejected_input_exits_with_one() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "old.pine", "//@version=4\nx = 1\n");

    let output = pinec(&["old.pine"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("error: Failed to compile `old.pine`"), "{}", err);
    assert!(err.contains("--> old.pine:1:1"), "{}", err);

    let output = pinec(&["old.pine", "--expect-version", "6"], dir.path());
    assert_eq!(output.status.code(), Some(1));

    write_source(&dir, "broken.pine", "//@version=5\nx = (1 +\n");
    let output = pinec(&["broken.pine"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("^"));
}

#[test]
fn test_usage_errors_exit_with_two() {
    let dir = TempDir::new().unwrap();
    write_source(&dir, "demo.pine", DEMO);

    assert_eq!(pinec(&[], dir.path()).status.code(), Some(2));
    assert_eq!(pinec(&["demo.pine", "--bogus"], dir.path()).status.code(), Some(2));
    assert_eq!(pinec(&["missing.pine"], dir.path()).status.code(), Some(2));
    assert_eq!(
        pinec(&["demo.pine", "--pine", "--script"], dir.path()).status.code(),
        Some(2)
    );

    let help = pinec(&["--help"], dir.path());
    assert!(help.status.success());
    assert!(stderr(&help).contains("--expect-version <n>"));
}
