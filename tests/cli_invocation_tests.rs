//! Integration tests for the pgoload binary's invocation modes
//!
//! Tests for --input, --serve, --burst and --config

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

fn pgoload() -> Command {
    Command::cargo_bin("pgoload").unwrap()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).unwrap_or_else(|e| {
        panic!("stdout is not JSON ({}):\n{}", e, stdout);
    })
}

#[test]
fn test_alice_request_end_to_end() {
    let output = pgoload()
        .args([
            "--no-profile",
            "--input",
            r#"{"iterations": 10, "complexity": 4, "name": "alice"}"#,
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "Command failed: {:?}", output);
    let body = stdout_json(&output);
    assert_eq!(body["name"], "alice");
    assert_eq!(body["iterations"], 10);
    assert!(body["result"].as_f64().unwrap().is_finite());
}

#[test]
fn test_empty_object_uses_defaults_within_time_budget() {
    let output = pgoload()
        .args(["--no-profile", "--input", "{}"])
        .timeout(Duration::from_secs(60))
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "Command failed: {:?}", output);
    let body = stdout_json(&output);
    assert_eq!(body["iterations"], 100_000);
    assert_eq!(body["name"], "world");
    assert!(body["result"].as_f64().unwrap().is_finite());
}

#[test]
fn test_no_input_uses_defaults() {
    let output = pgoload()
        .args(["--no-profile", "--cold-latency-us", "0"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["iterations"], 100_000);
}

#[test]
fn test_invalid_complexity_fails() {
    pgoload()
        .args(["--no-profile", "--input", r#"{"complexity": 2}"#])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("complexity"));
}

#[test]
fn test_malformed_input_strict_fails() {
    pgoload()
        .args(["--no-profile", "--input", "{nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to decode request"));
}

#[test]
fn test_malformed_input_lenient_defaults() {
    let output = pgoload()
        .args([
            "--no-profile",
            "--lenient",
            "--cold-latency-us",
            "0",
            "--input",
            "{nope",
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["name"], "world");
}

#[test]
fn test_parse_mode_reports_p95() {
    let output = pgoload()
        .args([
            "--no-profile",
            "--dispatch",
            "dynamic",
            "--input",
            r#"{"iterations": 500, "mode": "parse"}"#,
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["mode"], "parse");
    assert!(body["p95_estimate"].as_f64().unwrap().is_finite());
}

#[test]
fn test_rare_period_flag_changes_hit_count() {
    let output = pgoload()
        .args([
            "--no-profile",
            "--rare-period",
            "10",
            "--input",
            r#"{"iterations": 100}"#,
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["rare_hits"], 10);
}

#[test]
fn test_serve_mode_answers_each_line() {
    let output = pgoload()
        .args(["--no-profile", "--serve"])
        .write_stdin("{\"iterations\": 5, \"name\": \"x\"}\n{\"iterations\": 0}\n{\"name\": \"y\", \"iterations\": 7}\n")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["name"], "x");
    assert!(lines[1]["error"].as_str().unwrap().contains("iterations"));
    assert_eq!(lines[2]["iterations"], 7);
}

#[test]
fn test_burst_writes_profile_and_exits_zero() {
    let dir = TempDir::new().unwrap();
    let profile = dir.path().join("burst.pprof");

    let output = pgoload()
        .args(["--burst", "--profile-path"])
        .arg(&profile)
        .timeout(Duration::from_secs(60))
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert_eq!(stdout_json(&output)["iterations"], 100_000);
    assert!(profile.exists(), "profile file not written");
}

#[test]
fn test_unwritable_profile_path_does_not_block_workload() {
    let dir = TempDir::new().unwrap();
    let profile = dir.path().join("missing").join("cpu.pprof");

    let output = pgoload()
        .args(["--input", r#"{"iterations": 50}"#, "--profile-path"])
        .arg(&profile)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["iterations"], 50);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to start CPU capture"),
        "Missing capture warning. stderr:\n{}",
        stderr
    );
}

#[test]
fn test_config_file_applies() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(
        config,
        "[engine]\nrare_period = 5\ncold_latency_us = 0\n\n[profile]\nenabled = false\n"
    )
    .unwrap();

    let output = pgoload()
        .arg("--config")
        .arg(config.path())
        .args(["--input", r#"{"iterations": 25}"#])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["rare_hits"], 5);
}

#[test]
fn test_invalid_config_file_fails() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "[engine]\nrare_period = 1\n").unwrap();

    pgoload()
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("rare_period"));
}

#[test]
fn test_debug_flag_emits_tracing() {
    let output = pgoload()
        .args(["--debug", "--no-profile", "--input", r#"{"iterations": 3}"#])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("DEBUG") || stderr.contains("INFO") || stderr.contains("TRACE"),
        "No tracing output found in stderr: {}",
        stderr
    );
}

#[test]
fn test_default_log_level_is_info() {
    let output = pgoload()
        .env_remove("RUST_LOG")
        .args(["--no-profile", "--input", r#"{"iterations": 3}"#])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("INFO") && stderr.contains("invocation complete"),
        "Expected info-level tracing by default. stderr: {}",
        stderr
    );
    assert!(!stderr.contains("DEBUG"), "Debug output without --debug: {}", stderr);
}
