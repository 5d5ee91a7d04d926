//! Scan, library and server configuration types.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::model::LibraryKind;

/// Environment variable overriding the data directory.
pub const DATA_PATH_ENV: &str = "MANGOPEACH_DATA_PATH";

/// File name of the server configuration inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// File name of the catalog snapshot inside the data directory.
pub const CATALOG_FILE_NAME: &str = "catalog.json";

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Patterns to ignore (glob syntax, matched against entry names).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Extra attempts for a failed store write.
    #[builder(default = "2")]
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,

    /// Keep existing records under a directory that could not be read,
    /// instead of treating the subtree as empty.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub preserve_unreadable: bool,
}

fn default_true() -> bool {
    true
}

fn default_store_retries() -> u32 {
    2
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref patterns) = self.ignore_patterns {
            compile_patterns(patterns).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Compile the ignore patterns into a matcher.
    pub fn ignore_matcher(&self) -> Result<GlobSet, CatalogError> {
        compile_patterns(&self.ignore_patterns).map_err(|e| CatalogError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_hidden: true,
            ignore_patterns: Vec::new(),
            store_retries: 2,
            preserve_unreadable: true,
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

/// One configured library, as written in the server config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: LibraryKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Periodic rescan interval as a humantime duration, e.g. `"30m"` or
    /// `"1h 30m"`.
    ///
    /// Cron expressions such as `"0 * * * *"` are not accepted; a library
    /// with one is logged and left unscheduled.
    #[serde(default)]
    pub scan_interval: Option<String>,
}

impl LibraryConfig {
    /// Config for an enabled local library without a schedule.
    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: LibraryKind::Local,
            enabled: true,
            scan_interval: None,
        }
    }

    /// Set the rescan interval.
    pub fn with_scan_interval(mut self, interval: impl Into<String>) -> Self {
        self.scan_interval = Some(interval.into());
        self
    }
}

/// Server configuration stored as `config.json` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub libraries: Vec<LibraryConfig>,

    #[serde(default)]
    pub scan: ScanConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            libraries: Vec::new(),
            scan: ScanConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a config file. A missing file yields `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, CatalogError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found");
                return Ok(None);
            }
            Err(err) => {
                return Err(CatalogError::InvalidConfig {
                    message: format!("failed to read {}: {err}", path.display()),
                });
            }
        };

        let config: ServerConfig =
            serde_json::from_slice(&data).map_err(|err| CatalogError::InvalidConfig {
                message: format!("failed to parse {}: {err}", path.display()),
            })?;
        config.scan.ignore_matcher()?;
        Ok(Some(config))
    }

    /// Write the config file (pretty-printed), creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(self)?;
            std::fs::write(path, json)
        };
        write().map_err(|err| CatalogError::InvalidConfig {
            message: format!("failed to write {}: {err}", path.display()),
        })?;
        tracing::info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Path of the config file inside a data directory.
    pub fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE_NAME)
    }

    /// Path of the catalog snapshot inside this config's data directory.
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(CATALOG_FILE_NAME)
    }
}

/// Default data directory: `MANGOPEACH_DATA_PATH`, else the platform data
/// directory, else `./data`.
pub fn default_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_PATH_ENV), dirs::data_dir())
}

fn data_dir_from(env_value: Option<OsString>, platform_dir: Option<PathBuf>) -> PathBuf {
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return PathBuf::from(value);
    }
    platform_dir
        .map(|dir| dir.join("mangopeach"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
