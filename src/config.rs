//! Persisted configuration: configured APIs, refresh policy and defaults.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that overrides the configuration directory.
pub const CONFIG_DIR_ENV: &str = "STAC_DL_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";
const CATALOG_FILE: &str = "catalog.json";

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds allowed to establish a connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed between reads of a response body.
    pub read_timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            user_agent: format!("stac-dl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Defaults applied to searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Items requested per page.
    pub limit: u64,
    /// Maximum pages fetched per API.
    pub page_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            page_limit: 10,
        }
    }
}

/// Defaults applied to downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory downloads are written to.
    pub directory: Option<PathBuf>,
    /// Whether GeoTIFF assets are streamed instead of downloaded.
    pub stream_cogs: bool,
    /// Whether a virtual raster is built per item.
    pub add_to_layers: bool,
    /// Directory containing `gdalbuildvrt`, if not on the search path.
    pub gdal_path: Option<PathBuf>,
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the download directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Sets whether GeoTIFF assets are streamed instead of downloaded.
    #[must_use]
    pub const fn with_stream_cogs(mut self, stream: bool) -> Self {
        self.stream_cogs = stream;
        self
    }

    /// Sets whether a virtual raster is built per item.
    #[must_use]
    pub const fn with_add_to_layers(mut self, add: bool) -> Self {
        self.add_to_layers = add;
        self
    }

    /// Sets the directory containing `gdalbuildvrt`.
    #[must_use]
    pub fn with_gdal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.gdal_path = Some(path.into());
        self
    }
}

/// A configured API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEntry {
    /// Identifier of the endpoint.
    pub id: String,
    /// Base URL of the endpoint.
    pub href: String,
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Time of the last successful catalog refresh.
    pub last_update: Option<DateTime<Utc>>,
    /// Seconds a refreshed catalog stays fresh.
    pub api_update_interval_secs: u64,
    /// HTTP settings.
    pub http: HttpConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Download defaults.
    pub download: DownloadConfig,
    /// Configured API endpoints.
    pub apis: Vec<ApiEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            last_update: None,
            api_update_interval_secs: 24 * 60 * 60,
            http: HttpConfig::default(),
            search: SearchConfig::default(),
            download: DownloadConfig::default(),
            apis: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the configuration directory.
    ///
    /// Uses `STAC_DL_CONFIG_DIR` when set, falling back to
    /// `$XDG_CONFIG_HOME/stac-dl`.
    #[must_use]
    pub fn config_dir() -> PathBuf {
        std::env::var_os(CONFIG_DIR_ENV).map_or_else(
            || {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("stac-dl")
            },
            PathBuf::from,
        )
    }

    /// Path of the configuration file inside `dir`.
    #[must_use]
    pub fn config_path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Path of the catalog cache inside `dir`.
    #[must_use]
    pub fn catalog_path(dir: &Path) -> PathBuf {
        dir.join(CATALOG_FILE)
    }

    /// Loads configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Loads configuration, returning defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Saves the configuration atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string(self)?;
        write_atomic(path, toml_str.as_bytes())
    }

    /// Adds an endpoint, replacing any existing entry with the same id.
    pub fn add_api(&mut self, id: impl ToString, href: impl ToString) {
        let entry = ApiEntry {
            id: id.to_string(),
            href: href.to_string(),
        };
        if let Some(existing) = self.apis.iter_mut().find(|a| a.id == entry.id) {
            *existing = entry;
        } else {
            self.apis.push(entry);
        }
    }

    /// Removes an endpoint by id or href. Returns true if one was removed.
    pub fn remove_api(&mut self, id_or_href: &str) -> bool {
        let before = self.apis.len();
        let href = id_or_href.trim_end_matches('/');
        self.apis
            .retain(|a| a.id != id_or_href && a.href.trim_end_matches('/') != href);
        self.apis.len() != before
    }

    /// Returns true if the catalog should be reloaded at `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let interval = i64::try_from(self.api_update_interval_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        self.last_update
            .is_none_or(|last| now.signed_duration_since(last) >= interval)
    }

    /// Records a successful catalog refresh.
    pub fn mark_refreshed(&mut self, now: DateTime<Utc>) {
        self.last_update = Some(now);
    }
}

/// Writes `contents` to `path` via a temporary file and rename.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be
/// written.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
