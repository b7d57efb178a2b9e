//! Unit tests for configuration resolution and graceful degradation
//!
//! Tests that manipulate `FINPROC_*` variables are marked with #[serial]
//! so they never race each other.

use finproc_common::config::{load_toml_config, ConfigOverrides, ServiceConfig, TomlConfig};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn clear_env() {
    for name in [
        "FINPROC_BIND",
        "FINPROC_PORT",
        "FINPROC_SCRIPTS_DIR",
        "FINPROC_INTERPRETER",
        "FINPROC_WORKSPACE_ROOT",
        "FINPROC_KEEP_WORKSPACES",
        "FINPROC_COMPUTATION_TIMEOUT_SECS",
        "FINPROC_MAX_CONCURRENT_JOBS",
    ] {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_defaults_without_any_source() {
    clear_env();
    let config = ServiceConfig::resolve(&ConfigOverrides::default(), None).unwrap();

    assert_eq!(config.port, 5780);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.scripts_dir, PathBuf::from("scripts"));
    assert!(config.computation_timeout.is_none());
    assert!(config.max_concurrent_jobs.is_none());
    assert!(!config.keep_workspaces);
    assert_eq!(config.log_level, "info");
}

#[test]
#[serial]
fn test_toml_values_apply_when_no_env_or_cli() {
    clear_env();
    let toml: TomlConfig = toml::from_str(
        r#"
        port = 6000
        interpreter = "python3.11"
        computation_timeout_secs = 120

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    let config = ServiceConfig::resolve(&ConfigOverrides::default(), Some(&toml)).unwrap();
    assert_eq!(config.port, 6000);
    assert_eq!(config.interpreter, "python3.11");
    assert_eq!(config.computation_timeout, Some(Duration::from_secs(120)));
    assert_eq!(config.log_level, "debug");
}

#[test]
#[serial]
fn test_env_beats_toml_and_cli_beats_env() {
    clear_env();
    let toml = TomlConfig {
        port: Some(6000),
        ..Default::default()
    };

    env::set_var("FINPROC_PORT", "6100");
    let from_env = ServiceConfig::resolve(&ConfigOverrides::default(), Some(&toml)).unwrap();
    assert_eq!(from_env.port, 6100);

    let overrides = ConfigOverrides {
        port: Some(6200),
        ..Default::default()
    };
    let from_cli = ServiceConfig::resolve(&overrides, Some(&toml)).unwrap();
    assert_eq!(from_cli.port, 6200);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_value_is_config_error() {
    clear_env();
    env::set_var("FINPROC_PORT", "not-a-port");
    let result = ServiceConfig::resolve(&ConfigOverrides::default(), None);
    assert!(result.is_err());
    clear_env();
}

#[test]
#[serial]
fn test_zero_timeout_means_unbounded() {
    clear_env();
    let overrides = ConfigOverrides {
        computation_timeout_secs: Some(0),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(&overrides, None).unwrap();
    assert!(config.computation_timeout.is_none());
}

#[test]
#[serial]
fn test_zero_concurrency_rejected() {
    clear_env();
    let overrides = ConfigOverrides {
        max_concurrent_jobs: Some(0),
        ..Default::default()
    };
    assert!(ServiceConfig::resolve(&overrides, None).is_err());
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(load_toml_config(Some(&missing)).is_err());
}

#[test]
fn test_explicit_config_file_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "scripts_dir = \"/opt/finproc/scripts\"\nkeep_workspaces = true\n").unwrap();

    let config = load_toml_config(Some(&path)).unwrap().unwrap();
    assert_eq!(config.scripts_dir, Some(PathBuf::from("/opt/finproc/scripts")));
    assert_eq!(config.keep_workspaces, Some(true));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_config_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"eighty\"").unwrap();
    assert!(load_toml_config(Some(&path)).is_err());
}
