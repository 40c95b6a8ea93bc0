//! Integration tests for the `calrelay` CLI binary.
//!
//! These tests use `assert_cmd` and `predicates` to exercise the resolve and
//! inspect subcommands through the actual binary, including stdin/stdout
//! piping, file I/O, and error handling.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use chrono::{DateTime, FixedOffset};
use predicates::prelude::*;

/// Helper: path to the club.ics fixture.
fn club_ics_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/club.ics")
}

/// Helper: read the club.ics fixture as a string.
fn club_ics() -> String {
    std::fs::read_to_string(club_ics_path()).expect("club.ics fixture must exist")
}

const MARCH: [&str; 4] = [
    "--from",
    "2024-03-01T00:00:00Z",
    "--to",
    "2024-04-08T00:00:00Z",
];

fn resolve_march(extra: &[&str]) -> Vec<serde_json::Value> {
    let output = Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path()])
        .args(MARCH)
        .args(extra)
        .output()
        .expect("binary runs");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("stdout is a JSON array")
}

/// Helper: read an RFC 3339 field of a draft.
fn time(value: &serde_json::Value) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value.as_str().expect("time is a string"))
        .expect("time is RFC 3339")
}

fn rfc3339(raw: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(raw).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolve subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn resolve_file_to_stdout() {
    let drafts = resolve_march(&[]);

    let names: Vec<&str> = drafts.iter().map(|d| d["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec!["Pub quiz", "Pub quiz (final)", "Pub quiz", "Pub quiz", "Annual meeting"]
    );
}

#[test]
fn resolve_keeps_local_time_across_dst() {
    let drafts = resolve_march(&[]);

    assert_eq!(time(&drafts[0]["start"]), rfc3339("2024-03-07T19:00:00+00:00"));
    assert_eq!(time(&drafts[2]["start"]), rfc3339("2024-03-28T19:00:00+00:00"));
    // London is on BST from 2024-03-31.
    let start = time(&drafts[3]["start"]);
    assert_eq!(start, rfc3339("2024-04-04T19:00:00+01:00"));
    assert_eq!(start.offset().local_minus_utc(), 3600);
    assert_eq!(time(&drafts[3]["end"]), rfc3339("2024-04-04T21:00:00+01:00"));
}

#[test]
fn resolve_applies_override_and_defaults() {
    let drafts = resolve_march(&[]);

    assert_eq!(drafts[0]["description"], "Teams of four, bring a pen");
    assert_eq!(drafts[0]["location"], "The Crown");

    let final_round = &drafts[1];
    assert_eq!(time(&final_round["start"]), rfc3339("2024-03-22T19:00:00+00:00"));
    assert_eq!(final_round["location"], "Unknown");
    assert_eq!(final_round["description"], "");
}

#[test]
fn resolve_with_custom_policy() {
    let drafts = resolve_march(&["--max-description", "10", "--default-location", "TBA"]);

    assert_eq!(drafts[0]["description"], "Teams o...");
    assert_eq!(drafts[4]["location"], "TBA");
}

#[test]
fn resolve_stdin_to_stdout() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve"])
        .args(MARCH)
        .write_stdin(club_ics())
        .assert()
        .success()
        .stdout(predicate::str::contains("Annual meeting"))
        .stdout(predicate::str::contains("Book chairs").not());
}

#[test]
fn resolve_jsonl_writes_one_draft_per_line() {
    let output = Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path(), "--jsonl"])
        .args(MARCH)
        .output()
        .expect("binary runs");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 5);
    for line in lines {
        let draft: serde_json::Value = serde_json::from_str(line).expect("each line is JSON");
        assert!(draft["name"].is_string());
    }
}

#[test]
fn resolve_file_to_file() {
    let output_path = std::env::temp_dir().join("calrelay-test-resolve-output.json");
    let _ = std::fs::remove_file(&output_path);

    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path(), "-o"])
        .arg(&output_path)
        .args(MARCH)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let content = std::fs::read_to_string(&output_path).expect("output file must exist");
    let drafts: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
    assert_eq!(drafts.len(), 5);

    let _ = std::fs::remove_file(&output_path);
}

#[test]
fn resolve_window_with_nothing_in_it() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path()])
        .args(["--from", "2023-01-01T00:00:00Z", "--to", "2023-02-01T00:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn resolve_rejects_inverted_window() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path()])
        .args(["--from", "2024-04-01T00:00:00Z", "--to", "2024-03-01T00:00:00Z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid window"));
}

#[test]
fn resolve_rejects_huge_days() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path()])
        .args(["--from", "2024-01-01T00:00:00Z", "--days", "9999999999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn resolve_rejects_bad_timestamp() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path(), "--from", "next tuesday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid RFC 3339 timestamp"));
}

#[test]
fn resolve_missing_file_fails() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", "/nonexistent/feed.ics"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn resolve_rejects_unknown_dst_policy() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .args(["resolve", "-i", club_ics_path(), "--dst-policy", "sometimes"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Inspect subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn inspect_summarizes_components() {
    let output = Command::cargo_bin("calrelay")
        .unwrap()
        .args(["inspect", "-i", club_ics_path()])
        .output()
        .expect("binary runs");
    assert!(output.status.success());

    let summary: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary.len(), 3);

    assert_eq!(summary[0]["kind"], "event");
    assert_eq!(summary[0]["recurring"], true);
    assert_eq!(summary[0]["exceptions"], 1);
    assert_eq!(summary[0]["overrides"], 1);
    assert_eq!(summary[0]["rule"], "FREQ=WEEKLY;BYDAY=TH");

    assert_eq!(summary[1]["summary"], "Annual meeting");
    assert_eq!(summary[1]["recurring"], false);

    assert_eq!(summary[2]["kind"], "todo");
}

// ─────────────────────────────────────────────────────────────────────────────
// General
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn version_flag() {
    Command::cargo_bin("calrelay")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("calrelay"));
}
