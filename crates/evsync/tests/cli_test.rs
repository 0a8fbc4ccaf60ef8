//! Integration tests for the `evsync` CLI binary.
//!
//! Argument parsing, help output, completions, config handling and exit
//! codes, plus a few end-to-end runs against a mock cloud API.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `evsync` binary with env isolation.
///
/// Clears all `EVSYNC_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn evsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("evsync");
    cmd.env("HOME", "/tmp/evsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/evsync-cli-test-nonexistent")
        .env_remove("EVSYNC_API_KEY")
        .env_remove("EVSYNC_CONFIG")
        .env_remove("EVSYNC_OUTPUT")
        .env_remove("EVSYNC_BASE_URL")
        .env_remove("EVSYNC_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

/// Config pointing at a mock server, local endpoints off, no retries.
fn mock_config(dir: &Path, server: &MockServer) -> PathBuf {
    write_config(
        dir,
        &format!(
            "base_url = \"{}\"\n\n[retry]\nmax_attempts = 1\n\n[local]\nenabled = false\n",
            server.uri()
        ),
    )
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

async fn mount_fleet(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit", "1000")
                .insert_header("x-ratelimit-remaining", "950")
                .set_body_json(json!([{ "deviceId": "dev-1", "tag": "Garage" }])),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/device/reported"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reported": { "Connected": 1, "intensity": 16, "maxcarint": 32 }
        })))
        .mount(server)
        .await;
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = evsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(
        text.contains("Usage"),
        "Expected 'Usage' in output:\n{text}"
    );
}

#[test]
fn test_help_flag() {
    evsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("charger")
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("set")),
    );
}

#[test]
fn test_version_flag() {
    evsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("evsync"));
}

#[test]
fn test_unknown_output_format_is_usage_error() {
    evsync_cmd()
        .args(["-o", "xml", "status"])
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    evsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("evsync"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    evsync_cmd()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_redacts_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "api_key = \"supersecret\"\nhold_window = 45\n");
    evsync_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("hold_window = 45")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("supersecret").not()),
        );
}

#[test]
fn test_missing_api_key_is_auth_exit() {
    let dir = tempfile::tempdir().unwrap();
    let output = evsync_cmd()
        .args(["status", "--config"])
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("No API key"));
}

#[test]
fn test_invalid_config_is_config_exit() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "timeout = 0\n");
    evsync_cmd()
        .args(["status", "--api-key", "k", "--config"])
        .arg(&path)
        .assert()
        .code(10);
}

#[test]
fn test_write_requires_local_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "");
    evsync_cmd()
        .args(["write", "dev-1", "Locked", "1", "--no-local", "--api-key", "k"])
        .arg("--config")
        .arg(&path)
        .assert()
        .code(2);
}

// ── Against a mock cloud ────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_status_json_lists_devices() {
    let server = MockServer::start().await;
    mount_fleet(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["status", "-o", "json", "--api-key", "k", "--config"])
        .arg(&config);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    let devices: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(devices[0]["device_id"], "dev-1");
    assert_eq!(devices[0]["connected"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_plain_resolves_tag() {
    let server = MockServer::start().await;
    mount_fleet(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["status", "garage", "-o", "plain", "--api-key", "k", "--config"])
        .arg(&config);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "dev-1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_key_is_auth_exit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["status", "--api-key", "bad", "--config"]).arg(&config);
    assert_eq!(run(cmd).await.status.code(), Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quota_reports_remaining_budget() {
    let server = MockServer::start().await;
    mount_fleet(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["quota", "-o", "json-compact", "--api-key", "k", "--config"])
        .arg(&config);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains(r#""remaining":950"#));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exhausted_quota_is_rate_limit_exit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["quota", "--api-key", "k", "--config"]).arg(&config);
    assert_eq!(run(cmd).await.status.code(), Some(9));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pairings_save_writes_seed_file() {
    let server = MockServer::start().await;
    mount_fleet(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let seeds = dir.path().join("seeds.json");
    let config = write_config(
        dir.path(),
        &format!(
            "base_url = \"{}\"\npairings_file = \"{}\"\n",
            server.uri(),
            seeds.display()
        ),
    );

    let mut cmd = evsync_cmd();
    cmd.args(["pairings", "--save", "-o", "plain", "--api-key", "k", "--config"])
        .arg(&config);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&seeds).unwrap()).unwrap();
    assert_eq!(saved[0]["device_id"], "dev-1");
    assert_eq!(saved[0]["tag"], "Garage");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_out_of_range_is_usage_error() {
    let server = MockServer::start().await;
    mount_fleet(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["set", "dev-1", "intensity", "200", "--api-key", "k", "--config"])
        .arg(&config);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(2), "{}", combined_output(&output));
    let writes = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/device/intensity")
        .count();
    assert_eq!(writes, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_writes_and_reports_held_value() {
    let server = MockServer::start().await;
    mount_fleet(&server).await;
    Mock::given(method("POST"))
        .and(path("/device/intensity"))
        .and(query_param("deviceId", "dev-1"))
        .and(query_param("value", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_string("true"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["set", "garage", "intensity", "20", "-o", "json", "--api-key", "k", "--config"])
        .arg(&config);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["device_id"], "dev-1");
    assert_eq!(outcome["control"], "intensity");
    assert_eq!(outcome["value"], 20.0);
    // The cloud cycle from connect has just run, so the throttle holds.
    assert_eq!(outcome["refreshed"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_action_start_sends_command() {
    let server = MockServer::start().await;
    mount_fleet(&server).await;
    Mock::given(method("POST"))
        .and(path("/device/startcharge"))
        .and(query_param("deviceId", "dev-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config(dir.path(), &server);

    let mut cmd = evsync_cmd();
    cmd.args(["action", "dev-1", "start", "-o", "json", "--api-key", "k", "--config"])
        .arg(&config);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(0), "{}", combined_output(&output));
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["device_id"], "dev-1");
    assert_eq!(outcome["response"]["status"], "ok");
}
