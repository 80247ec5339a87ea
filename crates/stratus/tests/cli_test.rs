#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! migration

use assert_cmd::Command;
use predicates::prelude::*;

/// A command isolated from any settings file on this machine
fn stratus(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stratus").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("STRATUS_CONFIG_PATH")
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path());
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("stratus").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("server"))
        .stdout(predicate::str::contains("dns"))
        .stdout(predicate::str::contains("classify"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("stratus").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stratus"));
}

#[test]
fn test_server_create_help() {
    let mut cmd = Command::cargo_bin("stratus").unwrap();
    cmd.args(["server", "create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<NAME>"))
        .stdout(predicate::str::contains("--plan"))
        .stdout(predicate::str::contains("--stopped"));
}

#[test]
fn test_dns_ensure_help() {
    let mut cmd = Command::cargo_bin("stratus").unwrap();
    cmd.args(["dns", "ensure", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<CONTENT>"))
        .stdout(predicate::str::contains("--proxied"));
}

#[test]
fn test_classify_server_error_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    stratus(&dir)
        .args(["classify", "--status", "503", "--message", "upstream unavailable"])
        .assert()
        .success()
        .stdout(predicate::str::contains("transient"));
}

#[test]
fn test_classify_not_found_code() {
    let dir = tempfile::tempdir().unwrap();
    stratus(&dir)
        .args(["classify", "--code", "ResourceNotFound", "--message", "gone"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not_found"));
}

#[test]
fn test_classify_with_provider_vocabulary() {
    let dir = tempfile::tempdir().unwrap();
    stratus(&dir)
        .args(["classify", "--code", "busy", "--provider", "sakura-cloud"])
        .assert()
        .success()
        .stdout(predicate::str::contains("transient"));

    stratus(&dir)
        .args(["classify", "--code", "busy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unclassified"));
}

#[test]
fn test_classify_uses_settings_overrides() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("stratus.yaml"),
        "classifier:\n  cloudflare:\n    transient_codes: [\"1015\"]\n",
    )
    .unwrap();

    stratus(&dir)
        .args(["classify", "--code", "1015", "--provider", "cloudflare"])
        .assert()
        .success()
        .stdout(predicate::str::contains("transient"));
}

#[test]
fn test_classify_unknown_provider() {
    let dir = tempfile::tempdir().unwrap();
    stratus(&dir)
        .args(["classify", "--code", "x", "--provider", "aws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown provider"));
}

#[test]
fn test_invalid_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("stratus.yaml"), "poll:\n  interval_secs: 0\n").unwrap();

    stratus(&dir)
        .args(["classify", "--status", "500"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll.interval_secs"));
}

#[test]
fn test_dns_requires_credentials() {
    let dir = tempfile::tempdir().unwrap();
    stratus(&dir)
        .env_remove("CLOUDFLARE_API_TOKEN")
        .env_remove("CLOUDFLARE_ZONE_ID")
        .env_remove("CLOUDFLARE_DOMAIN")
        .args(["dns", "show", "mcp-prod"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLOUDFLARE_API_TOKEN"));
}
