//! Tests for layered settings loading

use std::path::PathBuf;

use tempfile::TempDir;

use quibble::config::{local_config_path, Settings};
use quibble::domain::{EnvLists, ProvisionPlan};

fn write_local(dir: &TempDir, content: &str) {
    std::fs::write(local_config_path(dir.path()), content).unwrap();
}

#[test]
fn given_local_config_when_loading_then_overrides_defaults() {
    // Arrange
    let temp = TempDir::new().unwrap();
    write_local(
        &temp,
        r#"
http_port = 8080
log_dir = "artifacts"

[envlist]
default = ["lint", "shell"]

[environments.shell]
description = "Interactive shell"
commands = [["bash", "{posargs}"]]
"#,
    );

    // Act
    let settings = Settings::load(Some(temp.path())).unwrap();

    // Assert
    assert_eq!(settings.http_port, 8080);
    assert_eq!(settings.log_dir, Some(PathBuf::from("artifacts")));
    assert_eq!(settings.envlist.default, vec!["lint".to_string(), "shell".to_string()]);
    assert_eq!(settings.envlist.ci, EnvLists::default().ci);
    assert!(settings.environments.contains_key("shell"));
    assert!(settings.environments.contains_key("unit"));
    assert!(settings.environment_set().validate().is_ok());
}

#[test]
fn given_local_clones_when_loading_then_replace_defaults_and_expand_home() {
    // Arrange
    let temp = TempDir::new().unwrap();
    write_local(
        &temp,
        r#"
[provision]
packages = []

[[provision.clones]]
url = "https://example.org/r/core"
dest = "~/git/core.git"
"#,
    );

    // Act
    let settings = Settings::load(Some(temp.path())).unwrap();

    // Assert
    assert!(settings.provision.packages.is_empty());
    assert_eq!(settings.provision.services, ProvisionPlan::default().services);
    assert_eq!(settings.provision.clones.len(), 1);
    let home = std::env::var("HOME").expect("HOME should be set");
    let dest = settings.provision.clones[0].dest.to_string_lossy().into_owned();
    assert!(dest.starts_with(&home));
    assert!(dest.ends_with("git/core.git"));
}

#[test]
fn given_broken_local_config_when_loading_then_config_error_names_file() {
    // Arrange
    let temp = TempDir::new().unwrap();
    write_local(&temp, "http_port = \"not a number\"\n");

    // Act
    let err = Settings::load(Some(temp.path())).unwrap_err();

    // Assert
    assert!(err.to_string().contains(".quibble.toml"));
}

#[test]
fn given_template_when_parsed_then_loads_as_defaults() {
    // Arrange
    let temp = TempDir::new().unwrap();
    write_local(&temp, &Settings::template());

    // Act
    let settings = Settings::load(Some(temp.path())).unwrap();

    // Assert
    assert_eq!(settings.http_port, 9412);
    assert_eq!(settings.provision, ProvisionPlan::default());
}

fn vars(pairs: &[(&str, &str)]) -> config::Map<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn given_quibble_variables_when_applying_overrides_then_scalars_replaced() {
    // Arrange
    let env = vars(&[
        ("QUIBBLE_HTTP_PORT", "8081"),
        ("QUIBBLE_GIT_CACHE", "/var/cache/git"),
        ("QUIBBLE_LOG_DIR", "artifacts"),
        ("OTHER_HTTP_PORT", "1"),
    ]);

    // Act
    let settings = Settings::default().with_env_overrides(Some(env)).unwrap();

    // Assert
    assert_eq!(settings.http_port, 8081);
    assert_eq!(settings.git_cache, Some(PathBuf::from("/var/cache/git")));
    assert_eq!(settings.log_dir, Some(PathBuf::from("artifacts")));
}

#[test]
fn given_invalid_port_variable_when_applying_overrides_then_config_error() {
    let err = Settings::default()
        .with_env_overrides(Some(vars(&[("QUIBBLE_HTTP_PORT", "high")])))
        .unwrap_err();

    assert!(err.to_string().contains("QUIBBLE_HTTP_PORT=high"));
}
