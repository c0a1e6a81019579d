//! Integration tests for CLI commands.
//!
//! Every test points the runtime, data and config locations at its own
//! temporary directory, so no real daemon or engine is touched.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a Command for the clipocr binary, isolated in `dir`
fn clipocr(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("clipocr").unwrap();
    cmd.env("CLIPOCR_RUNTIME_DIR", dir.path().join("run"))
        .env("CLIPOCR_DATA_DIR", dir.path().join("data"))
        .env("CLIPOCR_CONFIG", dir.path().join("config"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_command() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Screen-region OCR to clipboard"))
        .stdout(predicate::str::contains("recognize"))
        .stdout(predicate::str::contains("hold"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("purge"));
}

#[test]
fn test_no_subcommand_prints_help() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_version_command() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("clipocr"));
}

#[test]
fn test_status_no_daemon() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Stopped, "));
}

#[test]
fn test_status_ignores_stale_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("run")).unwrap();
    fs::write(dir.path().join("run").join("clipocr.pid"), "2000000000").unwrap();

    clipocr(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Stopped, "));
}

#[test]
fn test_stop_no_daemon() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .arg("stop")
        .assert()
        .success()
        .stdout(predicate::str::contains("Already stopped."));
}

#[test]
fn test_recognize_without_engine() {
    let dir = tempfile::tempdir().unwrap();
    for subcommand in ["recognize", "ocr", "hold"] {
        clipocr(&dir)
            .arg(subcommand)
            .assert()
            .failure()
            .stderr(predicate::str::contains("not downloaded"));
    }
}

#[test]
fn test_start_without_engine() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not downloaded"));
    assert!(!dir.path().join("run").join("clipocr.pid").exists());
}

#[test]
fn test_purge_with_nothing_installed() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .arg("nuke")
        .assert()
        .success()
        .stdout(predicate::str::contains("Already stopped."))
        .stdout(predicate::str::contains("Nothing to remove."));
}

#[test]
fn test_purge_removes_engine() {
    let dir = tempfile::tempdir().unwrap();
    let pyenv = dir.path().join("data").join("pyenv");
    fs::create_dir_all(pyenv.join("bin")).unwrap();

    clipocr(&dir)
        .arg("purge")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!pyenv.exists());
}

#[test]
fn test_start_help() {
    let dir = tempfile::tempdir().unwrap();
    clipocr(&dir)
        .args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--foreground"));
}
