//! Integration tests for the `repeatr` CLI binary.
//!
//! These tests cover argument parsing, help output, shell completions,
//! config handling, and the commands that only read persisted state, all
//! without touching the real network stack.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `repeatr` binary with env isolation.
///
/// Clears all `REPEATR_*` env vars so tests never read the host's real
/// configuration or state.
fn repeatr_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("repeatr");
    cmd.env_remove("REPEATR_CONFIG")
        .env_remove("REPEATR_STATE_DIR")
        .env_remove("REPEATR_OUTPUT")
        .env_remove("REPEATR_AP_PASSPHRASE")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// A scratch directory holding a config file and an empty state directory.
struct Sandbox {
    _dir: TempDir,
    config: PathBuf,
    state: PathBuf,
}

impl Sandbox {
    fn new(extra: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        let state = dir.path().join("state");
        std::fs::write(
            &config,
            format!(
                "state_dir = \"{}\"\n{extra}",
                state.display().to_string().replace('\\', "/")
            ),
        )
        .unwrap();
        Self {
            _dir: dir,
            config,
            state,
        }
    }

    fn with_passphrase() -> Self {
        Self::new("[access_point]\nssid = \"attic\"\npassphrase = \"correct horse battery\"\n")
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = repeatr_cmd();
        cmd.arg("--config").arg(&self.config);
        cmd
    }

    fn state_file(&self, name: &str) -> PathBuf {
        self.state.join(name)
    }
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = repeatr_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    repeatr_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("repeater")
            .and(predicate::str::contains("boot"))
            .and(predicate::str::contains("mode"))
            .and(predicate::str::contains("firewall")),
    );
}

#[test]
fn test_version_flag() {
    repeatr_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("repeatr"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    repeatr_cmd().arg("teleport").assert().code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    repeatr_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("repeatr"));
}

#[test]
fn test_completions_zsh() {
    repeatr_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_invalid_shell() {
    repeatr_cmd().args(["completions", "tcsh"]).assert().failure();
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let sandbox = Sandbox::new("");
    sandbox
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_validate_accepts_good_file() {
    Sandbox::with_passphrase()
        .cmd()
        .args(["config", "validate"])
        .assert()
        .success()
        .stderr(predicate::str::contains("is valid"));
}

#[test]
fn test_config_validate_requires_passphrase() {
    let output = Sandbox::new("")
        .cmd()
        .args(["config", "validate"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("passphrase"));
}

#[test]
fn test_config_validate_passphrase_from_env() {
    Sandbox::new("[access_point]\npassphrase_env = \"TEST_AP_SECRET\"\n")
        .cmd()
        .env("TEST_AP_SECRET", "from the environment")
        .args(["config", "validate"])
        .assert()
        .success();
}

#[test]
fn test_config_validate_rejects_short_passphrase() {
    let output = Sandbox::new("[access_point]\npassphrase = \"short\"\n")
        .cmd()
        .args(["config", "validate"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("access_point.passphrase"));
}

#[test]
fn test_config_validate_rejects_range_outside_subnet() {
    let output = Sandbox::new(
        "[access_point]\npassphrase = \"correct horse battery\"\n[dhcp]\nrange_start = \"10.0.0.10\"\n",
    )
    .cmd()
    .args(["config", "validate"])
    .output()
    .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("dhcp.range_start"));
}

#[test]
fn test_config_show_redacts_passphrase() {
    let output = Sandbox::with_passphrase()
        .cmd()
        .args(["config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("attic"));
    assert!(!text.contains("correct horse battery"), "passphrase leaked:\n{text}");
}

#[test]
fn test_config_show_json() {
    let output = Sandbox::with_passphrase()
        .cmd()
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["access_point"]["ssid"], "attic");
    assert_eq!(json["access_point"]["passphrase"], "********");
}

// ── Status / mode (persisted state only) ────────────────────────────

#[test]
fn test_status_on_fresh_state_dir() {
    let output = Sandbox::with_passphrase()
        .cmd()
        .args(["status", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["bridge_mode"], "client");
    assert_eq!(json["uplink_forwarding"], true);
    assert!(json["role_binding"].is_null());
    assert!(json["boot"].is_null());
}

#[test]
fn test_status_reads_persisted_mode() {
    let sandbox = Sandbox::with_passphrase();
    write(&sandbox.state_file("bridge-mode"), "bridged\n");
    sandbox
        .cmd()
        .args(["mode", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bridged"));
}

#[test]
fn test_status_plain_before_first_boot() {
    Sandbox::with_passphrase()
        .cmd()
        .args(["status", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::diff("never\n"));
}

#[test]
fn test_corrupt_binding_is_a_state_error() {
    let sandbox = Sandbox::with_passphrase();
    write(&sandbox.state_file("role-binding.json"), "{ not json");
    sandbox.cmd().arg("status").assert().code(7);
}

#[test]
fn test_state_dir_flag_overrides_config() {
    let sandbox = Sandbox::with_passphrase();
    let other = tempfile::tempdir().unwrap();
    write(&other.path().join("bridge-mode"), "bridged\n");
    sandbox
        .cmd()
        .arg("--state-dir")
        .arg(other.path())
        .args(["mode", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bridged"));
}

// ── Firewall preview ────────────────────────────────────────────────

#[test]
fn test_firewall_show_client_mode() {
    Sandbox::with_passphrase()
        .cmd()
        .args(["firewall", "show", "--uplink", "wlan1", "--ap", "wlan0"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("*nat")
                .and(predicate::str::contains("-A POSTROUTING -o wlan1 -j MASQUERADE"))
                .and(predicate::str::contains("-A FORWARD -i wlan0 -o wlan1 -j ACCEPT"))
                .and(predicate::str::contains("-A FORWARD -i wlan0 -o eth0 -j ACCEPT")),
        );
}

#[test]
fn test_firewall_show_bridged_rules_json() {
    let output = Sandbox::with_passphrase()
        .cmd()
        .args([
            "firewall", "show", "--uplink", "wlan1", "--ap", "wlan0", "--mode", "bridged",
            "--rules", "-o", "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let rules: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert!(rules.iter().any(|r| r["spec"]
        .as_str()
        .unwrap()
        .contains("--physdev-in eth0")));
    assert!(rules.iter().any(|r| r["table"] == "nat" && r["chain"] == "POSTROUTING"));
}

#[test]
fn test_firewall_show_without_forwarding() {
    Sandbox::with_passphrase()
        .cmd()
        .args([
            "firewall", "show", "--uplink", "wlan1", "--ap", "wlan0", "--no-forwarding",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("MASQUERADE")
                .not()
                .and(predicate::str::contains("-A FORWARD -i wlan0 -o eth0 -j ACCEPT")),
        );
}

#[test]
fn test_firewall_fingerprint_is_stable() {
    let sandbox = Sandbox::with_passphrase();
    let run = || {
        let output = sandbox
            .cmd()
            .args(["fw", "show", "--uplink", "wlan1", "--ap", "wlan0", "-o", "plain"])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    };
    let first = run();
    assert_eq!(first.trim().len(), 16);
    assert_eq!(first, run());
}

#[test]
fn test_firewall_uplink_requires_ap() {
    Sandbox::with_passphrase()
        .cmd()
        .args(["firewall", "show", "--uplink", "wlan1"])
        .assert()
        .code(2);
}
