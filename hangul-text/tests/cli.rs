use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

fn expected_report(name: &str) -> serde_json::Value {
    let raw = match name {
        "lesson" => include_str!("fixtures/expected/lesson.json"),
        _ => include_str!("fixtures/expected/no-hangul.json"),
    };
    serde_json::from_str(raw).expect("valid fixture")
}

#[test]
fn cli_reads_file_path() {
    let output = Command::new(env!("CARGO_BIN_EXE_hangul_text"))
        .arg("tests/fixtures/text/lesson.txt")
        .output()
        .expect("run CLI");

    assert!(
        output.status.success(),
        "cli exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let actual: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("cli prints JSON");
    assert_eq!(actual, expected_report("lesson"));
}

#[test]
fn cli_reads_stdin_when_no_args() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_hangul_text"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn CLI");

    let text = include_str!("fixtures/text/no-hangul.txt");
    child
        .stdin
        .as_mut()
        .expect("stdin open")
        .write_all(text.as_bytes())
        .expect("write stdin");

    let output = child.wait_with_output().expect("read CLI output");
    assert!(
        output.status.success(),
        "cli exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let actual: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("cli prints JSON");
    assert_eq!(actual, expected_report("no-hangul"));
}

#[test]
fn cli_rejects_extra_arguments() {
    let output = Command::new(env!("CARGO_BIN_EXE_hangul_text"))
        .args(["a.txt", "b.txt"])
        .output()
        .expect("run CLI");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("b.txt"));
}

#[test]
fn cli_applies_rules_file_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rules = dir.path().join("rules.txt");
    fs::write(&rules, "# custom rules\n맵지만\n\n지만\n").expect("write rules");

    let mut child = Command::new(env!("CARGO_BIN_EXE_hangul_text"))
        .arg("--rules")
        .arg(&rules)
        .arg("--compact")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn CLI");
    child
        .stdin
        .as_mut()
        .expect("stdin open")
        .write_all("김치는 맵지만 맛있어요. 좋지만 비싸요.".as_bytes())
        .expect("write stdin");

    let output = child.wait_with_output().expect("read CLI output");
    assert!(
        output.status.success(),
        "cli exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert_eq!(stdout.trim().lines().count(), 1);

    let report: serde_json::Value = serde_json::from_str(&stdout).expect("cli prints JSON");
    let rules: Vec<&str> = report["examples"]
        .as_array()
        .expect("examples array")
        .iter()
        .filter_map(|example| example["pattern"].as_str())
        .collect();
    assert_eq!(rules, vec!["맵지만", "지만"]);
}

#[test]
fn cli_reports_invalid_rule() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rules = dir.path().join("rules.txt");
    fs::write(&rules, "지만\n(unclosed\n").expect("write rules");

    let output = Command::new(env!("CARGO_BIN_EXE_hangul_text"))
        .arg("--rules")
        .arg(&rules)
        .arg("tests/fixtures/text/lesson.txt")
        .output()
        .expect("run CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid rule"), "stderr: {stderr}");
}
