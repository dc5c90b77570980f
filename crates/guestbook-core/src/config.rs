//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/guestbook/config.toml)
//! 3. Environment variables, including those set by a `.env` file
//!
//! Environment variables take precedence over config file values. A `.env`
//! file never replaces a variable that is already set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::couch::Client;

/// Environment variable prefix for guestbook-specific settings
const ENV_PREFIX: &str = "GUESTBOOK";

/// Database URL, including credentials
const ENV_DATABASE_URL: &str = "CLOUDANT_URL";

/// HTTP listen port
const ENV_PORT: &str = "PORT";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// CouchDB server URL. Without it the guestbook runs without storage.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Database holding the visitors
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Port for `guestbook serve`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for database requests other than feeds; 0 disables it
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_name: default_db_name(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (CLOUDANT_URL, PORT, GUESTBOOK_DB_NAME, GUESTBOOK_LOG_LEVEL)
    /// 2. Config file (~/.config/guestbook/config.toml or GUESTBOOK_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_with_cli_override(None)
    }

    /// Load configuration, using `path` instead of the default file when given
    ///
    /// A `.env` file in the working directory (or a parent) is read first.
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        Self::load_env_file(None)?;
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_path(&Self::config_file_path()),
        }
    }

    /// Export the variables of a `.env` file into the process environment
    ///
    /// Without `path` the file is searched for from the working directory up.
    /// A missing file is not an error.
    pub fn load_env_file(path: Option<&Path>) -> Result<()> {
        let result = match path {
            Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
            None => dotenvy::dotenv(),
        };
        match result {
            Ok(path) => {
                debug!(path = %path.display(), "loaded .env file");
                Ok(())
            }
            Err(e) if e.not_found() => {
                debug!("no .env file found");
                Ok(())
            }
            Err(e) => Err(e).context("Failed to load .env file"),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var(ENV_DATABASE_URL) {
            self.database_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(ENV_PORT) {
            self.port = val
                .parse()
                .with_context(|| format!("Invalid {} value: {:?}", ENV_PORT, val))?;
        }

        // GUESTBOOK_DB_NAME
        if let Ok(val) = std::env::var(format!("{}_DB_NAME", ENV_PREFIX)) {
            if !val.is_empty() {
                self.db_name = val;
            }
        }

        // GUESTBOOK_LOG_LEVEL
        if let Ok(val) = std::env::var(format!("{}_LOG_LEVEL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.log_level = val;
            }
        }

        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with GUESTBOOK_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("guestbook")
            .join("config.toml")
    }

    /// Timeout for non-feed database requests
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Client for the configured database server, if any
    pub fn database_client(&self) -> Result<Option<Client>> {
        let Some(url) = self.database_url.as_deref() else {
            return Ok(None);
        };
        let client = Client::with_timeout(url, self.request_timeout())
            .context("Failed to create database client")?;
        Ok(Some(client))
    }
}

fn default_db_name() -> String {
    "mydb".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}
