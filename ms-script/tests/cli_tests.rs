use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

fn script_file(name: &str, source: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let path = std::env::temp_dir().join(format!("ms-script-run-{name}-{now}.js"));
    std::fs::write(&path, source).expect("write script file");
    path
}

#[test]
fn script_logs_reach_stderr_and_result_reaches_stdout() {
    let path = script_file(
        "log",
        "log('hello from script');\nout({doubled: input.n * 2});",
    );
    let output = Command::new(env!("CARGO_BIN_EXE_ms-script-run"))
        .arg(&path)
        .args(["--bind", "input={\"n\":21}"])
        .env("RUST_LOG", "info")
        .output()
        .expect("run ms-script-run");
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success(), "{output:?}");
    let stdout: Value = serde_json::from_slice(&output.stdout).expect("stdout is json");
    assert_eq!(stdout, json!({"doubled": 42}));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hello from script"), "{stderr}");
}

#[test]
fn script_errors_fail_the_process() {
    let path = script_file("error", "let a = null;\nout(a.b);");
    let output = Command::new(env!("CARGO_BIN_EXE_ms-script-run"))
        .arg(&path)
        .output()
        .expect("run ms-script-run");
    let _ = std::fs::remove_file(&path);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("line 2: cannot read property 'b' of null"), "{stderr}");
}
