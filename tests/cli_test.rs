//! Binary smoke tests

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("toolauth")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("authorize"))
        .stdout(predicate::str::contains("logout"));
}

#[test]
fn test_invalid_config_is_reported() {
    let (_dir, path) = common::temp_config_file(
        r#"
server:
  timeout_seconds: 0
"#,
    );
    Command::cargo_bin("toolauth")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout"));
}

#[test]
fn test_status_without_oauth_providers() {
    let (_dir, path) = common::temp_config_file(
        r#"
token_store: memory
providers:
  plainTool:
    tools: [echo]
"#,
    );
    Command::cargo_bin("toolauth")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No OAuth providers configured"));
}
