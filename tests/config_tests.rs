//! Integration tests for the config module
//!
//! Test Organization:
//! - Configuration Loading
//! - Configuration Saving
//! - Configuration Validation
//! - Command-line Overrides

use dep_provisioner::config::{
    load_config_from_file, render_config, save_config_to_file, ConfigOverrides, ProvisionConfig,
};
use dep_provisioner::error::ConfigError;
use dep_provisioner::models::{SourceBackend, ToolchainGate};
use std::fs;
use std::path::PathBuf;

const FULL_CONFIG: &str = r#"
workspace = "libs"
backend = "libgit2"
lock_stale_after_secs = 600

[dependency]
origin = "https://github.com/LibreDWG/libredwg"
revision = "4340d0bcabc298ae1dca706040bf6998e59911c2"
name = "libredwg"

[patch]
target = "src/dwg.spec"
declaration = '#include "spec.h"'
gate = { compiler = "clang", max_major = 16 }

[configure]
generator = "Ninja"
args = ["-DLIBREDWG_DISABLE_JSON=ON"]

[package]
abi = "napi"
strip = false

[package.env]
CC = "clang"
CXX = "clang++"
"#;

// ============================================================================
// CONFIGURATION LOADING TESTS
// ============================================================================

#[test]
fn test_load_full_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("provision.toml");
    fs::write(&path, FULL_CONFIG)?;

    let config = load_config_from_file(&path)?;
    assert_eq!(config.backend, SourceBackend::Libgit2);
    assert_eq!(config.lock_stale_after_secs, 600);
    assert_eq!(config.dependency.name, "libredwg");
    assert_eq!(
        config.patch.gate,
        Some(ToolchainGate {
            compiler: "clang".to_string(),
            max_major: 16
        })
    );
    assert_eq!(config.configure.generator.as_deref(), Some("Ninja"));
    assert!(!config.package.strip);
    assert_eq!(config.package.env.get("CXX").map(String::as_str), Some("clang++"));
    // untouched sections keep their defaults
    assert_eq!(config.git.depth, 1);
    assert_eq!(config.package.program, "npx");
    config.validate()?;
    Ok(())
}

#[test]
fn test_relative_paths_resolve_against_config_dir() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let app_dir = temp_dir.path().join("app");
    fs::create_dir_all(&app_dir)?;
    let path = app_dir.join("provision.toml");
    fs::write(&path, "workspace = \"../vendor\"\n")?;

    let config = load_config_from_file(&path)?;
    assert_eq!(config.workspace, app_dir.join("../vendor"));
    assert_eq!(config.project_dir, app_dir.join("."));
    Ok(())
}

#[test]
fn test_empty_file_yields_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("provision.toml");
    fs::write(&path, "")?;

    let config = load_config_from_file(&path)?;
    assert_eq!(config.dependency, ProvisionConfig::default().dependency);
    assert!(config.workspace.is_absolute());
    Ok(())
}

#[test]
fn test_load_invalid_toml_returns_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("provision.toml");
    fs::write(&path, "[dependency\norigin = ")?;

    let result = load_config_from_file(&path);
    assert!(matches!(result, Err(ConfigError::InvalidToml(_))));
    Ok(())
}

#[test]
fn test_unknown_backend_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("provision.toml");
    fs::write(&path, "backend = \"svn\"\n")?;

    assert!(load_config_from_file(&path).is_err());
    Ok(())
}

#[test]
fn test_load_missing_file_returns_error() {
    let result = load_config_from_file(&PathBuf::from("/nonexistent/provision.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn test_non_toml_extension_rejected() {
    let result = load_config_from_file(&PathBuf::from("/tmp/provision.json"));
    assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
}

// ============================================================================
// CONFIGURATION SAVING TESTS
// ============================================================================

#[test]
fn test_save_then_load_preserves_settings() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("nested/provision.toml");

    let mut config = ProvisionConfig {
        workspace: temp_dir.path().join("libs"),
        project_dir: temp_dir.path().to_path_buf(),
        ..Default::default()
    };
    config.package.env.insert("CC".to_string(), "clang".to_string());
    config.git.depth = 5;
    save_config_to_file(&config, &path)?;

    let loaded = load_config_from_file(&path)?;
    assert_eq!(loaded, config);
    Ok(())
}

#[test]
fn test_render_contains_sections() -> Result<(), Box<dyn std::error::Error>> {
    let rendered = render_config(&ProvisionConfig::default())?;
    assert!(rendered.contains("[dependency]"));
    assert!(rendered.contains("[package]"));
    assert!(rendered.contains("revision = \"4340d0bcabc298ae1dca706040bf6998e59911c2\""));
    Ok(())
}

// ============================================================================
// CONFIGURATION VALIDATION TESTS
// ============================================================================

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = ProvisionConfig::default();
    config.git.depth = 0;
    assert!(config.validate().is_err());

    let mut config = ProvisionConfig::default();
    config.dependency.name = "../escape".to_string();
    assert!(config.validate().is_err());

    let mut config = ProvisionConfig::default();
    config.package.env.insert("BAD=KEY".to_string(), "x".to_string());
    assert!(config.validate().is_err());

    let mut config = ProvisionConfig::default();
    config.configure.program = "  ".to_string();
    assert!(config.validate().is_err());
}

// ============================================================================
// COMMAND-LINE OVERRIDES
// ============================================================================

#[test]
fn test_overrides_apply_on_top_of_file() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("provision.toml");
    fs::write(&path, FULL_CONFIG)?;

    let mut config = load_config_from_file(&path)?;
    config.apply_overrides(ConfigOverrides {
        workspace: Some(PathBuf::from("/srv/deps")),
        origin: Some("https://example.com/fork.git".to_string()),
        env: vec![("CC".to_string(), "gcc".to_string())],
        ..Default::default()
    });

    assert_eq!(config.workspace, PathBuf::from("/srv/deps"));
    assert_eq!(config.dependency.origin, "https://example.com/fork.git");
    assert_eq!(config.package.env.get("CC").map(String::as_str), Some("gcc"));
    assert_eq!(config.package.env.get("CXX").map(String::as_str), Some("clang++"));
    Ok(())
}
