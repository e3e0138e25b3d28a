//! Smoke tests to verify command wiring

use assert_cmd::Command;
use predicates::prelude::*;

fn chc() -> Command {
    let mut cmd = Command::cargo_bin("chc").unwrap();
    // Keep runs independent of the developer's config and database
    cmd.env("HOME", std::env::temp_dir().join("chc-smoke-no-home"))
        .env_remove("DATABASE_URL");
    cmd
}

#[test]
fn test_help_lists_commands() {
    chc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("catalog"));
}

#[test]
fn test_serve_help() {
    chc()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Allow permissive CORS"));
}

#[test]
fn test_completions_bash() {
    chc()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chc"));
}

#[test]
fn test_add_range_rejects_inverted_bounds() {
    chc()
        .args(["catalog", "add-range", "--start", "500", "--end", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not exceed"));
}

#[test]
fn test_import_rejects_unknown_collection() {
    chc()
        .args(["catalog", "import", "--collection", "users", "--file", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown collection"));
}

#[test]
fn test_config_path() {
    chc()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".chc/config.toml"));
}

#[test]
fn test_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    let run = |args: &[&str]| {
        let mut cmd = Command::cargo_bin("chc").unwrap();
        cmd.env("HOME", home.path()).env_remove("DATABASE_URL").args(args);
        cmd.assert()
    };

    run(&["config", "init"])
        .success()
        .stdout(predicate::str::contains("Created config"));
    run(&["config", "init"])
        .failure()
        .stderr(predicate::str::contains("--force"));
    run(&["config", "show"])
        .success()
        .stdout(predicate::str::contains("bind = \"127.0.0.1:8000\""));
}
