//! Integration tests for basic CLI behavior.
//!
//! Covers the standard flags, subcommand help, and the offline subcommands
//! (`parse`, `at`, `anchor`) against caption files on disk.

#![allow(deprecated)] // cargo_bin deprecation: replacement not yet stable

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SAMPLE: &str = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:03.000\nHello <i>there</i>\n\n2\n00:00:04.000 --> 00:00:06.500\nSecond &amp; last\n";

/// Helper: get a Command for the `capsync` binary.
fn capsync() -> Command {
    Command::cargo_bin("capsync").expect("binary 'capsync' should be built")
}

/// Helper: write `content` to a caption file in a fresh temp dir.
fn caption_file(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("live.vtt");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

/// Config path that doesn't exist, so the user's own config never leaks in.
fn no_config(dir: &Path) -> PathBuf {
    dir.join("missing-config.toml")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    capsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: capsync"))
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("at"))
        .stdout(predicate::str::contains("anchor"))
        .stdout(predicate::str::contains("follow"));
}

#[test]
fn version_flag_shows_semver() {
    capsync()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^capsync \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_subcommand_fails() {
    capsync().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn follow_help_lists_options() {
    capsync()
        .args(["follow", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--start"))
        .stdout(predicate::str::contains("--offset"))
        .stdout(predicate::str::contains("--for"));
}

// ─── parse ───────────────────────────────────────────────────────────────────

#[test]
fn parse_lists_cues() {
    let (dir, path) = caption_file(SAMPLE);
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("parse")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("00:00:01.000 --> 00:00:03.000  Hello _there_"))
        .stdout(predicate::str::contains("00:00:04.000 --> 00:00:06.500  Second & last"))
        .stderr(predicate::str::contains("2 cues"));
}

#[test]
fn parse_json_output() {
    let (dir, path) = caption_file(SAMPLE);
    let output = capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("parse")
        .arg(&path)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let cues: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let cues = cues.as_array().unwrap();
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0]["start_time"], 1.0);
    assert_eq!(cues[0]["plain_text"], "Hello there");
    assert_eq!(cues[0]["segments"][1]["italic"], true);
    assert_eq!(cues[1]["end_time"], 6.5);
}

#[test]
fn parse_partial_document_keeps_complete_cues() {
    let truncated = "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nDone\n\n00:00:0";
    let (dir, path) = caption_file(truncated);
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("parse")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Done"))
        .stderr(predicate::str::contains("1 cues"));
}

#[test]
fn parse_empty_document_reports_no_cues() {
    let (dir, path) = caption_file("WEBVTT\n\n");
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("parse")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No cues"));
}

#[test]
fn parse_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("parse")
        .arg(dir.path().join("absent.vtt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

// ─── at ──────────────────────────────────────────────────────────────────────

#[test]
fn at_shows_active_cue() {
    let (dir, path) = caption_file(SAMPLE);
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("at")
        .arg(&path)
        .arg("2.0")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello _there_"))
        .stdout(predicate::str::contains("Second").not());
}

#[test]
fn at_end_time_is_exclusive() {
    let (dir, path) = caption_file(SAMPLE);
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("at")
        .arg(&path)
        .arg("3.0")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("no caption at 00:00:03.000"));
}

#[test]
fn at_applies_offset() {
    let (dir, path) = caption_file(SAMPLE);
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("at")
        .arg(&path)
        .arg("3.0")
        .args(["--offset", "1.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Second & last"));
}

#[test]
fn at_applies_negative_offset() {
    let (dir, path) = caption_file(SAMPLE);
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .arg("at")
        .arg(&path)
        .arg("5.0")
        .args(["--offset", "-3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello _there_"));
}

#[test]
fn at_honors_render_delay_from_config() {
    let (dir, path) = caption_file(SAMPLE);
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "render_delay_secs = 1.5\n").unwrap();
    capsync()
        .arg("--config")
        .arg(&config)
        .arg("at")
        .arg(&path)
        .arg("4.0")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello _there_"));
}

#[test]
fn invalid_config_fails() {
    let (dir, path) = caption_file(SAMPLE);
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "fetch_period_secs = 0\n").unwrap();
    capsync()
        .arg("--config")
        .arg(&config)
        .arg("at")
        .arg(&path)
        .arg("1.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fetch_period_secs"));
}

// ─── anchor ──────────────────────────────────────────────────────────────────

#[test]
fn anchor_landscape_base_padding() {
    let dir = TempDir::new().unwrap();
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .args(["anchor", "--container", "1920x800", "--video", "1920x1080"])
        .assert()
        .success()
        .stdout("24\n");
}

#[test]
fn anchor_landscape_with_chrome() {
    let dir = TempDir::new().unwrap();
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .args(["anchor", "--container", "1920x1080", "--chrome", "--platform", "desktop"])
        .assert()
        .success()
        .stdout("104\n");
}

#[test]
fn anchor_portrait_letterbox() {
    let dir = TempDir::new().unwrap();
    capsync()
        .arg("--config")
        .arg(no_config(dir.path()))
        .args(["anchor", "--container", "1080x1920", "--video", "1920x1080"])
        .assert()
        .success()
        .stdout("680.25\n");
}

#[test]
fn anchor_rejects_bad_size() {
    capsync()
        .args(["anchor", "--container", "wide"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--container"));
}
