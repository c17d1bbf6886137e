//! Command-line tests for the `contramock` binary.

use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;

const SCHEMA: &str = r#"
funcs: Greet: [#MockFunction & {
	args: [#User]
	maxCalls: 1
	returns: [vars.greeting + " " + args[0].Name]
}, #MockFunction & {
	args: [_]
	returns: ["again"]
}]
"#;

const CONFIG: &str = r#"
[vars]
greeting = "hello"

[types]
User = "{ Name: string }"
"#;

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_contramock"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("CONTRAMOCK_CONFIG")
        .args(args)
        .output()
        .unwrap()
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("schema.cue"), SCHEMA).unwrap();
    std::fs::write(dir.path().join("contramock.toml"), CONFIG).unwrap();
    dir
}

#[test]
fn test_check_lists_functions() {
    let dir = workspace();
    let output = run(dir.path(), &["check", "schema.cue"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Greet\n  overload 0: 1 args, maxCalls 1\n  overload 1: 1 args, maxCalls unbounded\n"
    );
}

#[test]
fn test_call_uses_config_and_quota() {
    let dir = workspace();
    let output = run(
        dir.path(),
        &["call", "schema.cue", "Greet", r#"{"Name": "ada"}"#, "--times", "2"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "[\"hello ada\"]\n[\"again\"]\n"
    );
}

#[test]
fn test_call_without_match_fails() {
    let dir = workspace();
    let output = run(dir.path(), &["call", "schema.cue", "Greet"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no overloads matched"));
}

#[test]
fn test_syntax_error_is_rendered() {
    let dir = workspace();
    std::fs::write(dir.path().join("broken.cue"), "funcs: {\n  Greet: ]\n}\n").unwrap();
    let output = run(dir.path(), &["check", "broken.cue"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.cue"), "{stderr}");
    assert!(stderr.contains("Greet: ]"), "{stderr}");
}

#[test]
fn test_argument_must_be_json() {
    let dir = workspace();
    let output = run(dir.path(), &["call", "schema.cue", "Greet", "not json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not JSON"));
}
