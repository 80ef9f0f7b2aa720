//! Binary-level tests for the waypost CLI.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("waypost")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_sync_requires_provider_url() {
    Command::cargo_bin("waypost")
        .unwrap()
        .args(["sync", "--api-key", "key_123"])
        .env_remove("WAYPOST_PROVIDER_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--provider-url"));
}

#[test]
fn test_config_with_missing_file_exits_with_config_error() {
    Command::cargo_bin("waypost")
        .unwrap()
        .args(["config", "--file", "/nonexistent/geofences.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid definitions file"));
}

#[test]
fn test_config_with_valid_file_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geofences.yaml");
    std::fs::write(
        &path,
        r#"
geofences:
  - id: "01J00000000000000000000000"
    tag: retail
    name: store-a
    geometry:
      shape: circle
      latitude: 52.37
      longitude: 4.89
      radius_meters: 150.0
"#,
    )
    .unwrap();

    Command::cargo_bin("waypost")
        .unwrap()
        .args(["config", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 geofence definition(s)"));
}
