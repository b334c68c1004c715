//! Integration tests for configuration loading.

use dashforge::config::{self, Config, DEFAULT_CONFIG_PATHS, DEFAULT_CRUSH_TOLERANCE};
use std::fs;
use tempfile::tempdir;

#[test]
fn load_explicit_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dashforge.toml");
    fs::write(
        &path,
        r#"
[tools]
timeout_secs = 600

[encoding]
disable_quality_crushing = true
hw_accel = "nvenc"

[[encoding.ladder]]
width = 1920
height = 1080
bitrate = 6000

[[encoding.ladder]]
width = 1280
height = 720
bitrate = 3000
preset = "fast"
"#,
    )
    .unwrap();

    let config = config::load_config_or_default(Some(&path)).unwrap();
    assert_eq!(config.tools.timeout_secs, Some(600));
    assert!(config.encoding.disable_quality_crushing);
    assert_eq!(config.encoding.hw_accel.as_deref(), Some("nvenc"));
    assert_eq!(config.encoding.ladder.len(), 2);
    assert_eq!(config.encoding.ladder[1].preset, "fast");
    assert_eq!(config.encoding.crush_tolerance, DEFAULT_CRUSH_TOLERANCE);
}

#[test]
fn warnings_do_not_fail_loading() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dashforge.toml");
    fs::write(
        &path,
        "[encoding]\nworking_directory = \"/nonexistent/dashforge-work\"\n",
    )
    .unwrap();

    let config = config::load_config(&path).unwrap();
    let warnings = config.validate();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("working_directory"));
}

#[test]
fn explicit_path_errors_are_reported() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let err = config::load_config_or_default(Some(&missing)).unwrap_err();
    assert!(format!("{err:#}").contains("missing.toml"));

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[tools]\ntimeout_secs = \"soon\"\n").unwrap();
    let err = config::load_config(&broken).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<dashforge_core::Error>(),
        Some(dashforge_core::Error::Config(_))
    ));
}

#[test]
fn default_search_locations() {
    assert_eq!(DEFAULT_CONFIG_PATHS[0], "./dashforge.toml");
    assert!(DEFAULT_CONFIG_PATHS
        .iter()
        .any(|p| p.starts_with("~/.config/dashforge")));
    assert!(DEFAULT_CONFIG_PATHS.contains(&"/etc/dashforge/config.toml"));
}

#[test]
fn default_config_is_usable() {
    let config = Config::default();
    assert!(config.validate().is_empty());
    assert_eq!(
        config.encoding.working_directory(),
        std::env::temp_dir()
    );
}
