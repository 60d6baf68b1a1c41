//! CLI integration tests for pg2mysql.
//!
//! These tests cover argument parsing, help output, and exit codes for
//! failures that happen before any database work.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the pg2mysql binary.
fn cmd() -> Command {
    Command::cargo_bin("pg2mysql").unwrap()
}

/// Write a config file whose databases listen on a port nothing serves.
fn unreachable_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
source:
  flavor: postgres
  database: app
  username: app
  password: secret
  host: 127.0.0.1
  port: 1
dest:
  flavor: mysql
  database: app
  username: root
  password: secret
  host: 127.0.0.1
  port: 1
"#
    )
    .unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_migrate_subcommand_help() {
    cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--truncate"))
        .stdout(predicate::str::contains("--debug"));
}

#[test]
fn test_verify_subcommand_help() {
    cmd()
        .args(["verify", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--debug"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pg2mysql"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: config.yml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_unknown_debug_value_rejected() {
    cmd()
        .args(["migrate", "--debug", "everything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yml", "verify"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source: [unclosed").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:\n  flavor: postgres\n  database: app").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "migrate"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_stop_without_schema_dump_exits_with_code_1() {
    let file = unreachable_config();

    // Rejected by validation before any connection is attempted.
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "migrate",
            "--debug",
            "stop",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("stop_after_schema_dump"));
}

#[test]
fn test_unreachable_database_exits_with_code_2() {
    let file = unreachable_config();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "verify"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Connection error"));
}
