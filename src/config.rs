//! Application-level configuration loading: API location, page sizes, snapshot
//! storage and lane geometry.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::services::motion::TrackGeometry;

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/async-race.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ASYNC_RACE_CONFIG_PATH";
/// Environment variable that overrides the configured API base URL.
const API_URL_ENV: &str = "ASYNC_RACE_API_URL";

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_GARAGE_PAGE_SIZE: u32 = 7;
const DEFAULT_WINNERS_PAGE_SIZE: u32 = 10;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SNAPSHOT_DIR: &str = ".async-race";
const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    api_url: String,
    garage_page_size: u32,
    winners_page_size: u32,
    request_timeout: Duration,
    snapshot_dir: PathBuf,
    persist_debounce: Duration,
    track: TrackGeometry,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    ///
    /// `ASYNC_RACE_API_URL` wins over the file for the API base URL.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        api_url = %config.api_url,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_api_url_override(env::var(API_URL_ENV).ok())
    }

    fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(api_url) = api_url.filter(|url| !url.trim().is_empty()) {
            info!(api_url = %api_url, "API base URL overridden from environment");
            self.api_url = api_url;
        }
        self
    }

    /// Same configuration pointed at another API and snapshot directory.
    pub fn with_endpoints(mut self, api_url: impl Into<String>, snapshot_dir: PathBuf) -> Self {
        self.api_url = api_url.into();
        self.snapshot_dir = snapshot_dir;
        self
    }

    /// Base URL of the race API.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Cars per garage page.
    pub fn garage_page_size(&self) -> u32 {
        self.garage_page_size
    }

    /// Winners per leaderboard page.
    pub fn winners_page_size(&self) -> u32 {
        self.winners_page_size
    }

    /// Timeout applied to every API request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Directory holding the local snapshot files.
    pub fn snapshot_dir(&self) -> &PathBuf {
        &self.snapshot_dir
    }

    /// Quiet period before a store change is written to disk.
    pub fn persist_debounce(&self) -> Duration {
        self.persist_debounce
    }

    /// Lane geometry used by headless rendering.
    pub fn track(&self) -> TrackGeometry {
        self.track
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    api_url: String,
    garage_page_size: u32,
    winners_page_size: u32,
    request_timeout_ms: u64,
    snapshot_dir: PathBuf,
    persist_debounce_ms: u64,
    track: TrackGeometry,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            garage_page_size: DEFAULT_GARAGE_PAGE_SIZE,
            winners_page_size: DEFAULT_WINNERS_PAGE_SIZE,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
            track: TrackGeometry::default(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            api_url: value.api_url.trim_end_matches('/').to_string(),
            garage_page_size: value.garage_page_size.max(1),
            winners_page_size: value.winners_page_size.max(1),
            request_timeout: Duration::from_millis(value.request_timeout_ms),
            snapshot_dir: value.snapshot_dir,
            persist_debounce: Duration::from_millis(value.persist_debounce_ms),
            track: value.track,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
