//! Bridge configuration
//!
//! Loaded from a TOML file. Every field has a default, so an empty file or no
//! file at all is a valid configuration.
//!
//! ```toml
//! catalog = "compact"
//! enforce_range_within_bounds = true
//! mappings_path = "mappings.json"
//! log_filter = "vcam_bridge=debug"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{CatalogVariant, TrackingCatalog, TrackingMode};
use crate::error::BridgeResult;
use crate::store::MappingStore;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "VCAM_CONFIG_PATH";
/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "vcam.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Perfect-sync vocabulary
    pub catalog: CatalogVariant,
    /// Clamp configured mapping ranges into their bounds on every edit
    pub enforce_range_within_bounds: bool,
    /// Persisted mapping document
    pub mappings_path: Option<PathBuf>,
    /// Default tracing filter for the command-line tool
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogVariant::default(),
            enforce_range_within_bounds: false,
            mappings_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> BridgeResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load from `path`, or from the first file [`find_config_file`] finds.
    ///
    /// A path given explicitly must exist. When nothing is found the
    /// defaults are returned.
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match find_config_file() {
                Some(path) => Self::from_file(&path),
                None => {
                    debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn catalog(&self) -> TrackingCatalog {
        TrackingCatalog::new(self.catalog)
    }

    /// Build a mapping store from this configuration.
    ///
    /// Loads `mappings_path` when the file exists; modes left empty are
    /// seeded with catalog defaults.
    pub fn mapping_store(&self) -> BridgeResult<MappingStore> {
        let store = MappingStore::new(self.catalog())
            .with_range_enforcement(self.enforce_range_within_bounds);
        if let Some(path) = self.mappings_path.as_deref().filter(|p| p.exists()) {
            store.load_file(path)?;
        }
        for mode in TrackingMode::ALL {
            store.ensure_defaults(mode);
        }
        Ok(store)
    }

    pub fn to_toml_string(&self) -> BridgeResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Locate a config file: `VCAM_CONFIG_PATH` first, then `./vcam.toml`
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(env_path));
    }
    let local = env::current_dir().ok()?.join(CONFIG_FILE_NAME);
    local.exists().then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::mapping::{TrackingKey, TrackingMappingEntry};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_is_default() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert!(!config.enforce_range_within_bounds);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_parse_all_fields() {
        let config = BridgeConfig::from_toml_str(
            r#"
            catalog = "compact"
            enforce_range_within_bounds = true
            mappings_path = "/tmp/mappings.json"
            log_filter = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.catalog, CatalogVariant::Compact);
        assert!(config.enforce_range_within_bounds);
        assert_eq!(config.mappings_path, Some(PathBuf::from("/tmp/mappings.json")));
        assert_eq!(config.catalog().variant(), CatalogVariant::Compact);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            BridgeConfig::from_toml_str("catalog = \"huge\""),
            Err(BridgeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "catalog = \"standard\"\nlog_filter = \"warn\"\n").unwrap();

        let config = BridgeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.catalog, CatalogVariant::Standard);
        assert_eq!(config.log_filter, "warn");

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            BridgeConfig::load(Some(&missing)),
            Err(BridgeError::IoError(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BridgeConfig {
            catalog: CatalogVariant::Compact,
            enforce_range_within_bounds: true,
            mappings_path: Some(PathBuf::from("m.json")),
            log_filter: "trace".to_string(),
        };
        let parsed = BridgeConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[cfg(unix)]
    #[test]
    fn test_to_toml_string_reports_unserializable_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let config = BridgeConfig {
            mappings_path: Some(PathBuf::from(OsStr::from_bytes(b"\xffmappings.json"))),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            config.to_toml_string(),
            Err(BridgeError::ConfigSerializeError(_))
        ));
    }

    #[test]
    fn test_mapping_store_seeds_defaults() {
        let config = BridgeConfig {
            catalog: CatalogVariant::Standard,
            ..BridgeConfig::default()
        };
        let store = config.mapping_store().unwrap();
        assert_eq!(store.len(TrackingMode::BlendShape), 11);
        assert_eq!(store.len(TrackingMode::PerfectSync), 61);
    }

    #[test]
    fn test_mapping_store_loads_saved_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");

        let saved = MappingStore::new(TrackingCatalog::new(CatalogVariant::Standard));
        saved.add(
            TrackingMode::BlendShape,
            TrackingMappingEntry::new(
                TrackingKey::new("_mouth", 0.0..=1.0).with_range(-1.0, 2.0),
                TrackingKey::new("_mouth", 0.0..=1.0),
            ),
        );
        saved.save_file(&path).unwrap();

        let config = BridgeConfig {
            catalog: CatalogVariant::Standard,
            enforce_range_within_bounds: true,
            mappings_path: Some(path),
            ..BridgeConfig::default()
        };
        let store = config.mapping_store().unwrap();
        let entries = store.mappings(TrackingMode::BlendShape);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].input.range(), 0.0..=1.0);
        assert_eq!(store.len(TrackingMode::PerfectSync), 61);
    }
}
