// Drives the compiled binary without a TTY: the paths that must work (or fail
// cleanly) before the terminal UI is ever started.

use std::path::Path;
use std::process::Output;

use assert_cmd::Command;
use chrono::{Local, TimeZone};
use flick::session::ReadingSession;
use flick::stats::{ReadingStatistics, SqliteStatsStore, StatisticsStore};
use tempfile::TempDir;

/// Binary isolated from the user's config, log and statistics files
fn flick(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("flick").unwrap();
    cmd.arg("--db")
        .arg(dir.path().join("stats.db"))
        .arg("--config")
        .arg(dir.path().join("config.json"))
        .arg("--log-file")
        .arg(dir.path().join("flick.log"));
    cmd
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn seed_history(db: &Path) {
    let timestamp = Local.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let mut store = SqliteStatsStore::open(db).unwrap();
    store
        .save(&ReadingStatistics::from_sessions(vec![ReadingSession {
            id: timestamp.timestamp_millis(),
            timestamp,
            words_read: 600,
            active_duration_secs: 120.0,
            rate: 350,
            source: Some("essay.md".to_string()),
        }]))
        .unwrap();
}

#[test]
fn missing_file_fails_before_the_ui() {
    let dir = tempfile::tempdir().unwrap();
    let out = flick(&dir).arg("/no/such/book.txt").output().unwrap();

    assert!(!out.status.success());
    assert!(stderr(&out).contains("could not read"));
}

#[test]
fn unsupported_format_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("cover.png");
    std::fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();

    let out = flick(&dir).arg(&image).output().unwrap();
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unsupported format"));
}

#[test]
fn whitespace_only_text_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = flick(&dir).args(["--text", "   \n\t "]).output().unwrap();

    assert!(!out.status.success());
    assert!(stderr(&out).contains("no words"));
}

#[test]
fn reading_requires_a_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let out = flick(&dir).args(["--text", "hello there"]).output().unwrap();

    assert!(!out.status.success());
    assert!(stderr(&out).contains("stdout must be a tty"));
}

#[test]
fn stats_on_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let out = flick(&dir).arg("--stats").output().unwrap();

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("sessions:      0"));
    assert!(stdout.contains("average speed: 0 wpm"));
}

#[test]
fn stats_summarise_recorded_sessions() {
    let dir = tempfile::tempdir().unwrap();
    seed_history(&dir.path().join("stats.db"));

    let out = flick(&dir).arg("--stats").output().unwrap();
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("sessions:      1"));
    assert!(stdout.contains("words read:    600"));
    assert!(stdout.contains("active time:   2:00"));
    assert!(stdout.contains("average speed: 300 wpm"));
}

#[test]
fn export_csv_writes_history() {
    let dir = tempfile::tempdir().unwrap();
    seed_history(&dir.path().join("stats.db"));
    let csv_path = dir.path().join("out").join("history.csv");

    flick(&dir)
        .arg("--export-csv")
        .arg(&csv_path)
        .assert()
        .success();

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "id,timestamp,words_read,active_secs,rate,effective_wpm,source");
    assert!(lines[1].ends_with(",600,120.00,350,300.0,essay.md"));
}

#[test]
fn logs_go_to_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    flick(&dir).arg("--export-csv").arg(dir.path().join("h.csv")).assert().success();

    let log = std::fs::read_to_string(dir.path().join("flick.log")).unwrap();
    let first = log.lines().next().expect("at least one log line");
    let entry: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(entry["level"], "INFO");
}
