// Uploader configuration. Values are layered: built-in defaults, an
// optional JSON file, environment variables, then whatever the caller
// (usually the CLI) sets explicitly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::UploadError;

pub const DEFAULT_BASE_URL: &str = "https://dev-datahub.h2awsm.org";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_BASE_URL: &str = "DATAHUB_API_URL";
pub const ENV_API_TOKEN: &str = "DATAHUB_API_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "DATAHUB_TIMEOUT_SECS";

/// Everything an [`Uploader`](crate::api::Uploader) needs besides the
/// request itself.
#[derive(Debug, Clone, PartialEq)]
pub struct UploaderConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    /// Whole-request limit. `None` lets long uploads run to completion.
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Parsing config file {}", path.display()))
    }
}

/// Default location of the config file, e.g.
/// `~/.config/datahub-upload/config.json` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("datahub-upload").join("config.json"))
}

impl UploaderConfig {
    /// Resolve from an explicit config file, or the default location if it
    /// exists, then the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = match config_path {
            Some(path) => Some(FileConfig::load(path)?),
            None => match default_config_path() {
                Some(path) if path.is_file() => {
                    log::debug!("Using config file {}", path.display());
                    Some(FileConfig::load(&path)?)
                }
                _ => None,
            },
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Layer a parsed file and an environment lookup over the defaults.
    /// Split out from [`load`](Self::load) so precedence can be tested
    /// without touching the real environment.
    pub fn from_sources<F>(file: Option<FileConfig>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = UploaderConfig::default();

        if let Some(file) = file {
            if let Some(url) = file.base_url {
                config.base_url = url;
            }
            if file.api_token.is_some() {
                config.api_token = file.api_token;
            }
            if let Some(secs) = file.timeout_secs {
                config.timeout = Some(Duration::from_secs(secs));
            }
            if let Some(secs) = file.connect_timeout_secs {
                config.connect_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(url) = env(ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(token) = env(ENV_API_TOKEN) {
            config.api_token = Some(token);
        }
        if let Some(secs) = env(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_TIMEOUT_SECS))?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// The token to send, or a configuration error when none is usable.
    pub fn token(&self) -> Result<&str, UploadError> {
        match self.api_token.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Ok(t),
            _ => Err(UploadError::configuration(format!(
                "no API token configured (set {} or api_token in the config file)",
                ENV_API_TOKEN
            ))),
        }
    }
}
