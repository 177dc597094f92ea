//! Integration tests for the `hostwatch` CLI binary.
//!
//! These tests cover argument parsing, config handling and error exit
//! codes without a reachable SSH host.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `hostwatch` binary with env isolation.
fn hostwatch_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("hostwatch");
    cmd.env("HOME", "/tmp/hostwatch-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/hostwatch-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("HOSTWATCH_CONFIG")
        .env_remove("HOSTWATCH_OUTPUT");
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("hostwatch.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn with_config(path: &Path) -> assert_cmd::Command {
    let mut cmd = hostwatch_cmd();
    cmd.arg("--config").arg(path);
    cmd
}

/// A port nothing listens on, so connections are refused at once.
const TWO_DEVICES: &str = r#"
[devices.nas]
name = "Storage"
host = "127.0.0.1"
port = 1
username = "admin"
password = "secret"
mac_address = "aa:bb:cc:dd:ee:ff"
preset = "linux"

[devices.pi]
host = "127.0.0.1"
port = 1
identity_file = "/nonexistent/id_ed25519"
"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = hostwatch_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "{stderr}");
}

#[test]
fn test_help_lists_subcommands() {
    hostwatch_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("devices")
            .and(predicate::str::contains("exec"))
            .and(predicate::str::contains("poll"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_unknown_output_format_is_rejected() {
    hostwatch_cmd()
        .args(["-o", "yaml", "devices"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid value"));
}

// ── devices ─────────────────────────────────────────────────────────

#[test]
fn test_devices_table_lists_configured_hosts() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TWO_DEVICES);
    with_config(&path).arg("devices").assert().success().stdout(
        predicate::str::contains("Storage")
            .and(predicate::str::contains("admin@127.0.0.1:1"))
            .and(predicate::str::contains("turn_off, restart"))
            .and(predicate::str::contains("root@127.0.0.1:1")),
    );
}

#[test]
fn test_devices_json_carries_merged_preset() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TWO_DEVICES);
    let output = with_config(&path)
        .args(["-o", "json", "devices", "--device", "nas"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let devices: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let devices = devices.as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["id"], "nas");
    assert_eq!(devices[0]["mac_address"], "aa:bb:cc:dd:ee:ff");
    let sensors = devices[0]["sensors"].as_array().unwrap();
    assert!(sensors.iter().any(|s| s == "disk_usage"));
}

#[test]
fn test_devices_output_default_comes_from_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[defaults]\noutput = \"json-compact\"\n");
    with_config(&path)
        .arg("devices")
        .assert()
        .success()
        .stdout("[]\n");
}

#[test]
fn test_devices_unknown_name_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TWO_DEVICES);
    with_config(&path)
        .args(["devices", "--device", "ghost"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("ghost"));
}

// ── Config errors ───────────────────────────────────────────────────

#[test]
fn test_invalid_port_exits_with_usage_code() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "[devices.pi]\nhost = \"pi.local\"\nport = 0\npassword = \"x\"\n",
    );
    with_config(&path)
        .arg("devices")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("devices.pi.port"));
}

#[test]
fn test_missing_credentials_exit_with_auth_code() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[devices.pi]\nhost = \"pi.local\"\n");
    with_config(&path).arg("devices").assert().code(3);
}

#[test]
fn test_operation_without_devices_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    with_config(&path)
        .args(["exec", "uptime"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No devices configured"));
}

// ── Operations ──────────────────────────────────────────────────────

#[test]
fn test_set_with_unpaired_values_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TWO_DEVICES);
    with_config(&path)
        .args(["set", "--key", "nas.a", "--key", "nas.b", "--value", "1"])
        .assert()
        .code(2);
}

#[test]
fn test_exec_against_unreachable_host_reports_failed_record() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, TWO_DEVICES);
    let output = with_config(&path)
        .args(["-o", "json", "exec", "uptime", "--device", "nas", "--device", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["operation"], "execute_command");
    let records = result["results"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["success"] == false));
    let ghost = records.iter().find(|r| r["target"] == "ghost").unwrap();
    assert_eq!(ghost["error"]["kind"], "not_found");
}
