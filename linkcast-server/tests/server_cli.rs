//! Integration tests for the linkcast-server binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn server() -> Command {
    let mut cmd = Command::cargo_bin("linkcast-server").unwrap();
    cmd.env_remove("LINKCAST_CONFIG")
        .env_remove("LINKCAST_STATE_SECRET")
        .env_remove("LINKCAST_LINKEDIN_CLIENT_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_endpoints() {
    server()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("/authorize"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_missing_config_file_is_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("does-not-exist.toml");

    server()
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_is_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("linkcast.db");

    fs::write(
        &config_path,
        format!(
            r#"
[database]
path = "{}"

[links]
state_ttl_secs = 5
"#,
            db_path.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    server()
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("state_ttl_secs"));
}

#[test]
fn test_enabled_provider_without_secret_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("linkcast.db");

    fs::write(
        &config_path,
        format!(
            r#"
[database]
path = "{}"

[linkedin]
enabled = true
client_id = "client"
redirect_uri = "http://localhost:8080/callback"
"#,
            db_path.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    server()
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("linkedin.client_secret"));
}
