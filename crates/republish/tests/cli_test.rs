//! Integration tests for the `republish` binary.
//!
//! Argument parsing, config rendering and sensor table validation, all
//! without a live broker.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// `republish` with the user's config and `REPUBLISH_*` variables hidden.
fn republish_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("republish");
    cmd.env("HOME", "/tmp/republish-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/republish-cli-test-nonexistent")
        .env("PUB_SOURCE", "test-host")
        .env_remove("REPUBLISH_CONFIG")
        .env_remove("REPUBLISH_MQTT__HOST")
        .env_remove("REPUBLISH_MQTT__PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    republish_cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_subcommands() {
    republish_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("push-sensors"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn version_flag() {
    republish_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("republish"));
}

// ── config ──────────────────────────────────────────────────────────

#[test]
fn config_show_redacts_password() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "republish.toml",
        "[mqtt]\nhost = \"broker.lan\"\nusername = \"sensors\"\npassword = \"hunter2\"\n",
    );

    republish_cmd()
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("broker.lan")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("test-host"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn invalid_config_value_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "republish.toml",
        "[publish]\nscan_interval = \"often\"\n",
    );

    republish_cmd()
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("publish.scan_interval"));
}

#[test]
fn config_path_works_without_a_config_file() {
    republish_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml").or(predicate::str::contains("republish.toml")));
}

// ── push-sensors ────────────────────────────────────────────────────

#[test]
fn push_rejects_invalid_table_without_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let table = write(
        dir.path(),
        "sensors.json",
        r#"{"1": {"display_name": "A", "machine_name": "a"}, "2": {"machine_name": "b"}}"#,
    );

    republish_cmd()
        .arg("push-sensors")
        .arg(&table)
        // An unreachable broker would exit with 7; validation must fail first.
        .env("REPUBLISH_MQTT__HOST", "broker.invalid")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing_field"));
}

#[test]
fn push_dry_run_names_update_topic() {
    let dir = tempfile::tempdir().unwrap();
    let table = write(
        dir.path(),
        "sensors.json",
        r#"{"12345": {"display_name": "Back Porch", "machine_name": "back_porch"}}"#,
    );

    republish_cmd()
        .args(["push-sensors", "--dry-run"])
        .arg(&table)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "KTBMES/sensors/config/local_sensors/update",
        ));
}

#[test]
fn push_to_unresolvable_broker_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let table = write(
        dir.path(),
        "sensors.json",
        r#"{"12345": {"display_name": "Back Porch", "machine_name": "back_porch"}}"#,
    );

    republish_cmd()
        .arg("push-sensors")
        .arg(&table)
        .env("REPUBLISH_MQTT__HOST", "broker.invalid")
        .env("REPUBLISH_MQTT__CONNECT_ATTEMPTS", "1")
        .assert()
        .code(7);
}
