#![expect(
    clippy::unwrap_used,
    reason = "Test-only assertions use unwrap for clarity."
)]

//! CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("robot-console"));
    cmd.env_remove("ROBOT_CONSOLE_ROBOTS")
        .env_remove("ROBOT_CONSOLE_SCRIPTS_DIR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn smoke_help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("robots"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn smoke_no_args_prints_usage() {
    cli()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn smoke_robots_text_uses_scripts_dir() {
    cli()
        .args(["robots", "--scripts-dir", "/opt/zippy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("zippy6 (Zippy6)"))
        .stdout(predicate::str::contains("zippyx (ZippyX)"))
        .stdout(predicate::str::contains("/opt/zippy/run_command.sh"));
}

#[test]
fn smoke_robots_json() {
    let output = cli().args(["robots", "--json"]).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let robots = json.as_array().unwrap();
    assert_eq!(robots.len(), 4);
    assert_eq!(robots[0]["id"], "zippy6");
    assert_eq!(robots[0]["commands"][0]["label"], "Home System");
}

#[test]
fn smoke_robots_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("fleet.json");
    std::fs::write(
        &path,
        r#"[{"id":"bench","name":"Bench","image_key":"bench",
            "validation_script":["/bin/true"],
            "commands":[{"label":"Echo","command_args":["/bin/echo","hi"]}]}]"#,
    )
    .unwrap();

    cli()
        .args(["robots", "--robots"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("bench (Bench)"))
        .stdout(predicate::str::contains("[0] Echo: /bin/echo hi"));
}

#[test]
fn smoke_invalid_robot_file_is_config_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("fleet.json");
    std::fs::write(&path, "not json").unwrap();

    cli()
        .args(["robots", "--robots"])
        .arg(&path)
        .assert()
        .code(78)
        .stderr(predicate::str::contains("failed to parse robot table"));
}

#[test]
fn smoke_serve_refuses_remote_bind() {
    cli()
        .args(["serve", "--listen", "0.0.0.0:0"])
        .env_remove("ROBOT_CONSOLE_ALLOW_REMOTE")
        .assert()
        .code(64)
        .stderr(predicate::str::contains("non-loopback"));
}

#[test]
fn smoke_completions_bash() {
    cli()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("robot-console"));
}
