// Integration tests for the aiw command line.
//
// Each test writes a module into a temporary directory and runs the binary
// against it, checking exit codes, output files and stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn aiw_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_aiw"))
}

fn run(args: &[&str]) -> Output {
    Command::new(aiw_binary())
        .args(args)
        .env("AIW_LOG", "warn")
        .output()
        .expect("failed to run aiw")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

const WOVEN_OK: &str = r#"
module demo

[AttributeInjector.Injection]
class Log {
    [AttributeInjector.Rise(When.OnEntry)]
    public method Begin([AttributeInjector.Argument(Method.Name)] name: string) -> void {
        ret
    }
    [AttributeInjector.Rise(When.OnExit)]
    public method End([AttributeInjector.Argument(Method.Name)] name: string,
                      [AttributeInjector.Argument(Method.ReturnValue)] value: int32) -> void {
        ret
    }
}

class Worker {
    [Log]
    public method Compute() -> int32 {
        ldc.i4 5
        ret
    }
}
"#;

const CONFLICT: &str = r#"
module demo

[AttributeInjector.Injection]
class Log {
    [AttributeInjector.Rise(When.OnEntry)]
    public method Begin([AttributeInjector.Argument(Method.ReturnValue)] value: int32) -> void {
        ret
    }
}

class Worker {
    [Log]
    public method Compute() -> int32 {
        ldc.i4 5
        ret
    }
}
"#;

fn write_input(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write input");
    path
}

#[test]
fn weaves_to_the_output_path() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", WOVEN_OK);
    let output_path = dir.path().join("out.wil");

    let output = run(&[path_arg(&input), "-o", path_arg(&output_path)]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let woven = std::fs::read_to_string(&output_path).unwrap();
    assert!(woven.contains("hidden_instance"));
    assert!(woven.contains("call instance Log::End(string, int32) -> void"));
    assert!(!woven.contains("AttributeInjector"));
    // Input untouched.
    assert_eq!(std::fs::read_to_string(&input).unwrap(), WOVEN_OK);
}

#[test]
fn rewrites_in_place_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", WOVEN_OK);
    let output = run(&[path_arg(&input)]);
    assert!(output.status.success());
    let woven = std::fs::read_to_string(&input).unwrap();
    assert!(woven.contains("instance_field"));
}

#[test]
fn rule_violation_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", CONFLICT);
    let output = run(&[path_arg(&input)]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0101"), "stderr: {}", stderr);
    // Markers are stripped even though nothing was woven.
    let written = std::fs::read_to_string(&input).unwrap();
    assert!(!written.contains("AttributeInjector"));
    assert!(!written.contains("instance_field"));
}

#[test]
fn missing_input_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.wil");
    let output = run(&[path_arg(&missing)]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("aiw: error:"));
}

#[test]
fn parse_error_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "bad.wil", "module m class {");
    let output = run(&[path_arg(&input)]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn emit_advice_prints_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", WOVEN_OK);
    let output = run(&["--emit", "advice", path_arg(&input)]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let defs = json.as_array().unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0]["owner_name"], "Log");
    assert_eq!(defs[0]["advice"][0]["timing"], "on-entry");
    assert_eq!(defs[0]["advice"][1]["bindings"][1]["source"], "target-return-value");
    // Scanning never writes.
    assert_eq!(std::fs::read_to_string(&input).unwrap(), WOVEN_OK);
}

#[test]
fn emit_json_prints_a_loadable_module() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", WOVEN_OK);
    let output = run(&["--emit", "json", path_arg(&input)]);
    assert!(output.status.success());

    let module = aiw::module::Module::from_json(&String::from_utf8_lossy(&output.stdout)).unwrap();
    let log = module.type_by_name("Log").unwrap();
    assert_eq!(log.fields[0].name, "instance_field");
}

#[test]
fn json_input_round_trips_through_the_binary() {
    let dir = tempfile::tempdir().unwrap();
    let text = write_input(dir.path(), "m.wil", WOVEN_OK);
    let json = run(&["--emit", "json", "--no-verify", path_arg(&text)]);
    assert!(json.status.success());

    // Weaving the already woven JSON module changes nothing.
    let json_input = write_input(dir.path(), "m.json", &String::from_utf8_lossy(&json.stdout));
    let again = run(&["--emit", "json", path_arg(&json_input)]);
    assert!(again.status.success());
    let first: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    let second: serde_json::Value = serde_json::from_slice(&again.stdout).unwrap();
    assert_eq!(first, second);
}

#[test]
fn build_info_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", WOVEN_OK);
    let a = run(&["--emit", "build-info", path_arg(&input)]);
    let b = run(&["--emit", "build-info", path_arg(&input)]);
    assert!(a.status.success());
    assert_eq!(a.stdout, b.stdout);
    let json: serde_json::Value = serde_json::from_slice(&a.stdout).unwrap();
    assert_eq!(json["source_hash"].as_str().map(str::len), Some(64));

    let other = run(&[
        "--emit",
        "build-info",
        "--marker-namespace",
        "Other",
        path_arg(&input),
    ]);
    let other: serde_json::Value = serde_json::from_slice(&other.stdout).unwrap();
    assert_ne!(json["settings_fingerprint"], other["settings_fingerprint"]);
}

#[test]
fn settings_file_selects_the_marker_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let source = WOVEN_OK.replace("AttributeInjector.", "Acme.");
    let input = write_input(dir.path(), "m.wil", &source);
    let settings = write_input(
        dir.path(),
        "settings.json",
        r#"{ "marker-namespace": "Acme", "handle-storage": "shared" }"#,
    );
    let output = run(&["--settings", path_arg(&settings), path_arg(&input)]);
    assert!(output.status.success());
    let woven = std::fs::read_to_string(&input).unwrap();
    assert!(woven.contains("public static field instance_field: Log"));
}

#[test]
fn unknown_settings_key_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", WOVEN_OK);
    let settings = write_input(dir.path(), "settings.json", r#"{ "colour": "blue" }"#);
    let output = run(&["--settings", path_arg(&settings), path_arg(&input)]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn manifest_skips_unchanged_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "m.wil", WOVEN_OK);
    let manifest = dir.path().join("manifest.json");

    let first = run(&["--manifest", path_arg(&manifest), path_arg(&input)]);
    assert!(first.status.success());
    let woven = std::fs::read_to_string(&input).unwrap();
    assert!(manifest.exists());

    let second = run(&["--manifest", path_arg(&manifest), path_arg(&input)]);
    assert!(second.status.success());
    assert_eq!(std::fs::read_to_string(&input).unwrap(), woven);
}

#[test]
fn output_with_several_inputs_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_input(dir.path(), "a.wil", WOVEN_OK);
    let b = write_input(dir.path(), "b.wil", WOVEN_OK);
    let out = dir.path().join("out.wil");
    let output = run(&[path_arg(&a), path_arg(&b), "-o", path_arg(&out)]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!out.exists());
}
