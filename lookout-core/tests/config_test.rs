use lookout_lib::state::config::DEFAULT_INSTRUCTION;
use lookout_lib::state::{AppConfig, ConfigError, ConfigManager};
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let config = ConfigManager::load(dir.path().join("missing.json")).unwrap();

    assert_eq!(config, AppConfig::default());
    assert_eq!(config.inference.instruction, DEFAULT_INSTRUCTION);
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    // 父目录不存在时自动创建
    let path = dir.path().join("nested").join("lookout.json");

    let mut config = AppConfig::default();
    config.camera.prefer_front_facing = false;
    config.recovery.max_attempts = 5;
    config.inference.instruction = "What is on the table?".to_string();

    ConfigManager::save(&path, &config).unwrap();
    assert!(path.exists());

    let loaded = ConfigManager::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(!loaded.prefer_front_facing());
    assert_eq!(loaded.camera_settings().backoff.max_attempts, 5);
}

#[test]
fn test_malformed_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lookout.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = ConfigManager::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)));
}

#[test]
fn test_loaded_config_drives_pacing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lookout.json");
    std::fs::write(
        &path,
        r#"{ "inference": { "partial_interval_ms": 250, "error_cooldown_ms": 500 } }"#,
    )
    .unwrap();

    let pacing = ConfigManager::load(&path).unwrap().pacing_config();
    assert_eq!(pacing.partial_interval, Duration::from_millis(250));
    assert_eq!(pacing.error_cooldown, Duration::from_millis(500));
    assert_eq!(pacing.min_delay, Duration::from_millis(100));
}
