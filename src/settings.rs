//! Persisted client settings.
//!
//! The console stores two endpoints: the HTTP API base and the WebSocket
//! URL. They live in a small JSON file under the user's config directory.
//!
//! ```json
//! {
//!   "apiBaseUrl": "http://localhost:8000",
//!   "wsUrl": "ws://localhost:8000/ws"
//! }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use console_link::Settings;
//!
//! # async fn example() -> console_link::Result<()> {
//! let settings = Settings::load(Settings::default_path()?)?.with_env_overrides();
//! let manager = settings.connection_builder()?.build()?;
//! manager.connect()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::manager::ConnectionManagerBuilder;
use crate::manager::options::{DEFAULT_WS_URL, validate_ws_url};

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Environment variable overriding [`Settings::api_base_url`].
pub const API_URL_ENV: &str = "CONSOLE_API_URL";

/// Environment variable overriding [`Settings::ws_url`].
pub const WS_URL_ENV: &str = "CONSOLE_WS_URL";

/// Directory name under the platform config directory.
const APP_DIR: &str = "console-link";

/// Settings file name.
const FILE_NAME: &str = "settings.json";

// ============================================================================
// Settings
// ============================================================================

/// Endpoints the console talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// HTTP API base URL.
    pub api_base_url: String,

    /// WebSocket endpoint.
    pub ws_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }
}

// ============================================================================
// Settings - Persistence
// ============================================================================

impl Settings {
    /// Returns `<config dir>/console-link/settings.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the platform has no config directory.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
            .ok_or_else(|| Error::config("Could not determine config directory"))
    }

    /// Reads settings from `path`.
    ///
    /// A missing file yields the defaults. Missing fields take their default
    /// values.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file exists but cannot be read
    /// - [`Error::Json`] if the file is not valid settings JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Writes settings to `path` as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory or file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;

        debug!(path = %path.display(), "Saved settings");
        Ok(())
    }
}

// ============================================================================
// Settings - Overrides & Validation
// ============================================================================

impl Settings {
    /// Applies `CONSOLE_API_URL` and `CONSOLE_WS_URL` when set and non-empty.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(WS_URL_ENV).ok(),
        )
    }

    fn with_overrides(mut self, api_base_url: Option<String>, ws_url: Option<String>) -> Self {
        if let Some(url) = api_base_url.filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(url) = ws_url.filter(|url| !url.trim().is_empty()) {
            self.ws_url = url;
        }
        self
    }

    /// Checks both URLs.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if either URL does not parse
    /// - [`Error::InvalidUrl`] if the API URL is not `http`/`https` or the
    ///   WebSocket URL is not `ws`/`wss`
    pub fn validate(&self) -> Result<()> {
        let api = Url::parse(&self.api_base_url)?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(Error::invalid_url(
                &self.api_base_url,
                format!("expected http or https scheme, got {}", api.scheme()),
            ));
        }

        validate_ws_url(&self.ws_url)?;
        Ok(())
    }

    /// Returns a manager builder aimed at [`ws_url`](Self::ws_url).
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn connection_builder(&self) -> Result<ConnectionManagerBuilder> {
        self.validate()?;
        Ok(ConnectionManagerBuilder::new().url(self.ws_url.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
