//! Integration tests for ConfigManager and the data files
//!
//! These tests verify:
//! - Settings loading and saving (YAML)
//! - Default settings when the file is missing
//! - Catalog persistence (JSON) including query status
//! - Environment overrides
//! - Error handling for malformed files

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use mapsearch::config::EnvOverrides;
use mapsearch::{Catalog, ConfigManager, UserConfig};
use std::fs;
use tempfile::TempDir;

fn create_test_data_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let data_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, data_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    assert_eq!(manager.data_dir(), &data_path);
    assert_eq!(
        manager.user_config_path(),
        &data_path.join("MapSearch Settings.yaml")
    );
}

#[test]
fn test_data_directory_creation() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let nested = data_path.join("nested").join("MapSearch Data");

    assert!(!nested.exists());
    ConfigManager::new(&nested).unwrap();
    assert!(nested.exists());
}

#[test]
fn test_load_default_user_config() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    let config = manager.load_user_config().unwrap();
    let settings = &config.search_settings;

    assert!(settings.realtime_export);
    assert_eq!(settings.realtime_export_path, "poi_export.csv");
    assert!(!settings.auto_collect);
    assert_eq!(settings.auto_collect_times, "6:00 18:00 24:00");
    assert_eq!(
        config.field_settings.headers(),
        vec!["Name", "Address", "Phone", "Province", "City", "District"]
    );
}

#[test]
fn test_save_and_load_user_config() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    let mut config = UserConfig::default();
    config.search_settings.api_keys = "key-one key-two".to_string();
    config.search_settings.keywords = "museum".to_string();
    config.search_settings.auto_collect = true;
    config.field_settings.set_included("Location", true);
    config.field_settings.set_included("Phone", false);

    manager.save_user_config(&config).unwrap();
    let loaded = manager.load_user_config().unwrap();

    assert_eq!(loaded.search_settings.api_key_list(), vec!["key-one", "key-two"]);
    assert_eq!(loaded.search_settings.keywords, "museum");
    assert!(loaded.search_settings.auto_collect);
    assert!(loaded.field_settings.keys().contains(&"location"));
    assert!(!loaded.field_settings.keys().contains(&"tel"));
}

#[test]
fn test_partial_settings_file_uses_defaults() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    fs::write(
        manager.user_config_path(),
        "Search_Settings:\n  API Keys: \"abc\"\n  Keywords: \"park\"\n",
    )
    .unwrap();

    let config = manager.load_user_config().unwrap();
    assert_eq!(config.search_settings.api_keys, "abc");
    assert_eq!(config.search_settings.keywords, "park");
    assert!(config.search_settings.realtime_export);
    assert!(config.field_settings.has_selection());
}

#[test]
fn test_invalid_yaml_handling() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    fs::write(manager.user_config_path(), "Search_Settings: [unclosed").unwrap();

    let result = manager.load_user_config();
    assert!(result.is_err());
}

#[test]
fn test_catalog_round_trip_keeps_status_and_order() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    let mut catalog = Catalog::new();
    catalog.insert_region("Illinois", "Springfield", "170100").unwrap();
    catalog.insert_region("Illinois", "Chicago", "170200").unwrap();
    catalog.insert_region("Ohio", "Columbus", "390100").unwrap();
    let when = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    catalog.mark_queried("Chicago", when).unwrap();

    manager.save_catalog(&catalog).unwrap();
    let loaded = manager.load_catalog().unwrap();

    assert_eq!(loaded, catalog);
    assert_eq!(
        loaded.all_region_names(),
        vec!["Springfield", "Chicago", "Columbus"]
    );
    let chicago = loaded.get("Chicago").unwrap();
    assert_eq!(chicago.parent_group, "Illinois");
    assert_eq!(chicago.last_query_time, Some(when));
    assert_eq!(loaded.resolve_code("Columbus"), Some("390100"));
    assert_eq!(loaded.group_of("Columbus"), Some("Ohio"));

    // The temporary file from the atomic save is gone
    assert!(!data_path.join("MapSearch Catalog.json.tmp").exists());
}

#[test]
fn test_missing_catalog_is_empty() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    let catalog = manager.load_catalog().unwrap();
    assert!(catalog.is_empty());
}

#[test]
fn test_corrupt_catalog_is_an_error() {
    let (_temp_dir, data_path) = create_test_data_dir();
    let manager = ConfigManager::new(&data_path).unwrap();

    fs::write(data_path.join("MapSearch Catalog.json"), "{ not json").unwrap();
    assert!(manager.load_catalog().is_err());
}

#[test]
fn test_env_overrides_layer_over_file() {
    let mut vars = config::Map::new();
    vars.insert("MAPSEARCH__API_KEYS".to_string(), "env-key".to_string());
    vars.insert("MAPSEARCH__DEBUG_MODE".to_string(), "true".to_string());
    vars.insert("UNRELATED".to_string(), "ignored".to_string());

    let overrides = EnvOverrides::from_source(Some(vars)).unwrap();
    assert_eq!(overrides.api_keys.as_deref(), Some("env-key"));
    assert_eq!(overrides.debug_mode, Some(true));
    assert_eq!(overrides.keywords, None);

    let mut config = UserConfig::default();
    config.search_settings.keywords = "museum".to_string();
    overrides.apply(&mut config);

    assert_eq!(config.search_settings.api_keys, "env-key");
    assert!(config.search_settings.debug_mode);
    assert_eq!(config.search_settings.keywords, "museum");
}
