use crate::models::{Catalog, UserConfig};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;
use std::io::Write;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "MapSearch Data";

const SETTINGS_FILE: &str = "MapSearch Settings.yaml";
const CATALOG_FILE: &str = "MapSearch Catalog.json";

/// Prefix for environment overrides, e.g. `MAPSEARCH__API_KEYS`.
pub const ENV_PREFIX: &str = "MAPSEARCH";

/// Configuration manager for the settings and catalog files.
///
/// Manages two files inside the data directory:
/// - User settings (`MapSearch Settings.yaml`): keys, keyword, export options, fields
/// - Region catalog (`MapSearch Catalog.json`): provinces, cities and query status
#[derive(Debug, Clone)]
pub struct ConfigManager {
    data_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
    catalog_store: CatalogStore,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified data directory.
    ///
    /// # Arguments
    /// * `data_dir` - Directory containing the data files (e.g., "MapSearch Data")
    pub fn new<P: AsRef<Utf8Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        // Create data directory if it doesn't exist
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)
                .with_context(|| format!("Failed to create data directory: {}", data_dir))?;
        }

        Ok(Self {
            user_config_path: data_dir.join(SETTINGS_FILE),
            catalog_store: CatalogStore::new(data_dir.join(CATALOG_FILE)),
            data_dir,
        })
    }

    /// Load the user settings file, then apply `MAPSEARCH__*` environment overrides.
    ///
    /// # Returns
    /// The loaded UserConfig, or defaults if the file doesn't exist
    pub fn load_user_config(&self) -> Result<UserConfig> {
        let mut config = self.load_user_config_file()?;
        let overrides = EnvOverrides::from_environment()?;
        overrides.apply(&mut config);
        Ok(config)
    }

    fn load_user_config_file(&self) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User settings file not found at {}, using defaults",
                self.user_config_path
            );
            return Ok(UserConfig::default());
        }

        let file_contents = fs::read_to_string(&self.user_config_path)
            .with_context(|| format!("Failed to read user settings: {}", self.user_config_path))?;

        let config: UserConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse user settings: {}", self.user_config_path))?;

        tracing::info!("Loaded user settings from {}", self.user_config_path);
        Ok(config)
    }

    /// Save the user settings file.
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user settings to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user settings: {}", self.user_config_path))?;

        tracing::info!("Saved user settings to {}", self.user_config_path);
        Ok(())
    }

    /// Load the region catalog.
    pub fn load_catalog(&self) -> Result<Catalog> {
        self.catalog_store.load()
    }

    pub fn save_catalog(&self, catalog: &Catalog) -> Result<()> {
        self.catalog_store.save(catalog)
    }

    /// Store used by the orchestrator to persist status after each region.
    pub fn catalog_store(&self) -> &CatalogStore {
        &self.catalog_store
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }
}

/// Environment overrides layered over the settings file.
///
/// Read through the `config` crate from `MAPSEARCH__API_KEYS`,
/// `MAPSEARCH__KEYWORDS`, `MAPSEARCH__REALTIME_EXPORT_PATH` and
/// `MAPSEARCH__DEBUG_MODE`.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct EnvOverrides {
    pub api_keys: Option<String>,
    pub keywords: Option<String>,
    pub realtime_export_path: Option<String>,
    pub debug_mode: Option<bool>,
}

impl EnvOverrides {
    pub fn from_environment() -> Result<Self> {
        Self::from_source(None)
    }

    /// Read overrides from an explicit variable map instead of the process environment.
    pub fn from_source(vars: Option<config::Map<String, String>>) -> Result<Self> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(vars);

        config::Config::builder()
            .add_source(environment)
            .build()
            .context("Failed to read environment overrides")?
            .try_deserialize()
            .context("Invalid MAPSEARCH__* environment override")
    }

    pub fn apply(self, config: &mut UserConfig) {
        let settings = &mut config.search_settings;
        if let Some(keys) = self.api_keys {
            tracing::debug!("API keys overridden from environment");
            settings.api_keys = keys;
        }
        if let Some(keywords) = self.keywords {
            settings.keywords = keywords;
        }
        if let Some(path) = self.realtime_export_path {
            settings.realtime_export_path = path;
        }
        if let Some(debug) = self.debug_mode {
            settings.debug_mode = debug;
        }
    }
}

/// JSON file holding the region catalog.
///
/// Saves go through a temporary sibling file and a rename so a crash mid-write
/// never leaves a truncated catalog behind.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: Utf8PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load the catalog, or an empty one if the file doesn't exist.
    pub fn load(&self) -> Result<Catalog> {
        if !self.path.exists() {
            tracing::warn!("Catalog file not found at {}, starting empty", self.path);
            return Ok(Catalog::new());
        }

        let file_contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read catalog: {}", self.path))?;

        let mut catalog: Catalog = serde_json::from_str(&file_contents)
            .with_context(|| format!("Failed to parse catalog: {}", self.path))?;
        catalog.rehydrate();
        for violation in catalog.violations() {
            tracing::warn!("Catalog {}: {}", self.path, violation);
        }

        tracing::info!(
            "Loaded catalog from {}: {} groups, {} regions ({} queried)",
            self.path,
            catalog.group_count(),
            catalog.total_regions(),
            catalog.queried_count()
        );
        Ok(catalog)
    }

    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        let json = serde_json::to_string_pretty(catalog).context("Failed to serialize catalog")?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path))?;
            file.write_all(json.as_bytes())
                .with_context(|| format!("Failed to write {}", tmp_path))?;
            file.sync_all()
                .with_context(|| format!("Failed to flush {}", tmp_path))?;
        }
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace catalog: {}", self.path))?;

        tracing::debug!("Saved catalog to {}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_creates_missing_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = Utf8PathBuf::try_from(temp_dir.path().join("a/b")).unwrap();

        let manager = ConfigManager::new(&nested).unwrap();
        assert!(manager.data_dir().exists());
    }

    #[test]
    fn test_load_save_user_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = UserConfig::default();
        config.search_settings.keywords = "museum".to_string();
        config.search_settings.api_keys = "k1 k2".to_string();
        manager.save_user_config(&config).unwrap();

        let loaded = manager.load_user_config_file().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_user_config_uses_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        let loaded = manager.load_user_config_file().unwrap();
        assert_eq!(loaded, UserConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: config::Map<String, String> = [
            ("MAPSEARCH__API_KEYS".to_string(), "env1 env2".to_string()),
            ("MAPSEARCH__DEBUG_MODE".to_string(), "true".to_string()),
        ]
        .into_iter()
        .collect();

        let overrides = EnvOverrides::from_source(Some(vars)).unwrap();
        assert_eq!(overrides.api_keys.as_deref(), Some("env1 env2"));
        assert_eq!(overrides.debug_mode, Some(true));
        assert!(overrides.keywords.is_none());

        let mut config = UserConfig::default();
        config.search_settings.keywords = "park".to_string();
        overrides.apply(&mut config);

        assert_eq!(config.search_settings.api_keys, "env1 env2");
        assert!(config.search_settings.debug_mode);
        assert_eq!(config.search_settings.keywords, "park");
    }

    #[test]
    fn test_catalog_round_trip_keeps_status() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut catalog = Catalog::new();
        catalog.insert_region("Illinois", "Springfield", "170100").unwrap();
        catalog.insert_region("Illinois", "Chicago", "170200").unwrap();
        let when = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        catalog.mark_queried("Springfield", when).unwrap();

        manager.save_catalog(&catalog).unwrap();
        let loaded = manager.load_catalog().unwrap();

        let springfield = loaded.get("Springfield").unwrap();
        assert!(springfield.queried);
        assert_eq!(springfield.query_count, 1);
        assert_eq!(springfield.last_query_time, Some(when));
        assert_eq!(springfield.parent_group, "Illinois");
        assert_eq!(loaded.unqueried_names(), vec!["Chicago".to_string()]);

        // No temp file left behind
        assert!(!manager.catalog_store().path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_catalog_json_layout() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut catalog = Catalog::new();
        catalog.insert_region("Illinois", "Springfield", "170100").unwrap();
        manager.save_catalog(&catalog).unwrap();

        let raw = fs::read_to_string(manager.catalog_store().path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let city = &value["provinces"]["Illinois"]["cities"]["Springfield"];
        assert_eq!(city["adcode"], "170100");
        assert_eq!(city["queried"], false);
        assert_eq!(city["query_count"], 0);
        assert!(city["last_query_time"].is_null());
    }

    #[test]
    fn test_catalog_with_violations_still_loads() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(
            manager.catalog_store().path(),
            r#"{"provinces": {
                "A": {"adcode": "110000", "cities": {"Twin": {"adcode": "110100"}}},
                "B": {"adcode": "120000", "cities": {"Twin": {"adcode": "120100"}}}
            }}"#,
        )
        .unwrap();

        let catalog = manager.load_catalog().unwrap();
        assert_eq!(catalog.total_regions(), 2);
        assert_eq!(catalog.violations().len(), 1);
        assert_eq!(catalog.group_of("Twin"), Some("A"));
    }

    #[test]
    fn test_missing_catalog_is_empty() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.load_catalog().unwrap().is_empty());
    }
}
