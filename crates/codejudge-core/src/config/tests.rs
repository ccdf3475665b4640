use super::*;
use crate::errors::SandboxError;
use crate::recipes::Language;
use serial_test::serial;
use std::env;
use std::time::Duration;
use tempfile::tempdir;

fn clear_env() {
    env::remove_var(loader::SKIP_DOCKER_ENV);
    env::remove_var(loader::TIMEOUT_ENV);
}

#[test]
fn test_defaults_match_documented_ceilings() {
    let config = SandboxConfig::default();
    assert_eq!(config.limits.memory_bytes, 100 * MIB);
    assert_eq!(config.limits.cpu_period, 100_000);
    assert_eq!(config.limits.cpu_quota, 50_000);
    assert_eq!(config.limits.pids_limit, 100);
    assert_eq!(config.mount_path, "/code");
    assert_eq!(config.timeout(), Duration::from_secs(10));
    assert!(!config.force_local);
    assert_eq!(config.max_output_bytes, 1024 * 1024);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_yaml_with_language_overrides() {
    clear_env();
    let yaml = r#"
timeout_secs: 5
limits:
  memory_bytes: 268435456
languages:
  java:
    image: eclipse-temurin:17
    timeout_secs: 20
    limits:
      memory_bytes: 536870912
      pids_limit: 200
  python:
    command: ["python3", "code.py"]
"#;
    let config = ConfigLoader::from_str(yaml).unwrap();

    assert_eq!(config.timeout_secs, 5);
    // Unspecified limit fields keep their defaults.
    assert_eq!(config.limits.memory_bytes, 256 * MIB);
    assert_eq!(config.limits.pids_limit, 100);

    let java = Language::Java.recipe();
    assert_eq!(config.image_for(java), "eclipse-temurin:17");
    assert_eq!(config.timeout_for(Language::Java), Duration::from_secs(20));
    assert_eq!(config.limits_for(Language::Java).memory_bytes, 512 * MIB);
    assert_eq!(config.limits_for(Language::Java).pids_limit, 200);
    assert_eq!(config.command_for(java), java.command_vec());

    let python = Language::Python.recipe();
    assert_eq!(config.image_for(python), "python:3.9-slim");
    assert_eq!(config.command_for(python), vec!["python3", "code.py"]);
    assert_eq!(config.timeout_for(Language::Python), Duration::from_secs(5));
    assert_eq!(config.limits_for(Language::C), config.limits);
}

#[test]
#[serial]
fn test_unknown_language_key_is_rejected() {
    clear_env();
    let err = ConfigLoader::from_str("languages:\n  ruby:\n    image: ruby:3\n").unwrap_err();
    assert!(matches!(err, SandboxError::Config(_)));
}

#[test]
#[serial]
fn test_empty_document_yields_defaults() {
    clear_env();
    let config = ConfigLoader::from_str("  \n").unwrap();
    assert_eq!(config.timeout_secs, 10);
}

#[test]
#[serial]
fn test_skip_docker_env_forces_local() {
    clear_env();
    env::set_var(loader::SKIP_DOCKER_ENV, "true");
    let config = ConfigLoader::from_env();
    clear_env();

    assert!(config.unwrap().force_local);
}

#[test]
#[serial]
fn test_skip_docker_requires_literal_true() {
    clear_env();
    env::set_var(loader::SKIP_DOCKER_ENV, "1");
    let config = ConfigLoader::from_env();
    clear_env();

    assert!(!config.unwrap().force_local);
}

#[test]
#[serial]
fn test_timeout_env_overrides_file() {
    clear_env();
    env::set_var(loader::TIMEOUT_ENV, "42");
    let config = ConfigLoader::from_str("timeout_secs: 3\n");
    env::set_var(loader::TIMEOUT_ENV, "soon");
    let invalid = ConfigLoader::from_env();
    clear_env();

    assert_eq!(config.unwrap().timeout_secs, 42);
    assert!(matches!(invalid, Err(SandboxError::Config(_))));
}

#[tokio::test]
#[serial]
async fn test_from_file() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("codejudge.yaml");
    std::fs::write(&path, "force_local: true\nworkspace_prefix: judge\n").unwrap();

    let config = ConfigLoader::from_file(&path).await.unwrap();
    assert!(config.force_local);
    assert_eq!(config.workspace_prefix, "judge");

    let missing = ConfigLoader::from_file(dir.path().join("missing.yaml")).await;
    assert!(matches!(missing, Err(SandboxError::Config(_))));
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = SandboxConfig::default();
    config.timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = SandboxConfig::default();
    config.mount_path = "code".to_string();
    assert!(config.validate().is_err());

    let mut config = SandboxConfig::default();
    config.limits.memory_bytes = MIB;
    assert!(config.validate().is_err());

    let mut config = SandboxConfig::default();
    config.limits.cpu_quota = 10;
    assert!(config.validate().is_err());

    let mut config = SandboxConfig::default();
    config.limits.pids_limit = 0;
    assert!(config.validate().is_err());

    let mut config = SandboxConfig::default();
    config.max_output_bytes = 0;
    assert!(config.validate().is_err());

    let mut config = SandboxConfig::default();
    config.languages.insert(
        Language::C,
        LanguageOverride {
            command: Some(vec![]),
            ..Default::default()
        },
    );
    assert!(config.validate().is_err());
}
