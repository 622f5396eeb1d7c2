//! Client configuration.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** - [`RealtimeSettings::default()`]
//! 2. **Settings file** - JSON with snake_case keys, optional
//! 3. **Environment variables** - `ORBIT_*` overrides (highest priority)

use std::{path::Path, path::PathBuf, time::Duration};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Realtime client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// REST API base, e.g. `http://localhost:8001`.
    pub api_base_url: String,
    /// Notification socket base, e.g. `ws://localhost:8000`.
    pub ws_base_url: String,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * base`.
    pub reconnect_base_delay_ms: u64,
    /// Keepalive ping period while connected.
    pub heartbeat_interval_ms: u64,
    /// Where the session credential is persisted. `None` uses the default location.
    pub credentials_path: Option<PathBuf>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8001".to_string(),
            ws_base_url: "ws://localhost:8000".to_string(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 3000,
            heartbeat_interval_ms: 30_000,
            credentials_path: None,
        }
    }
}

impl RealtimeSettings {
    /// Load defaults, then `path` if given and present, then `ORBIT_*` environment variables.
    ///
    /// # Errors
    /// Returns error if the file does not parse, a value has the wrong type, or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::build(path, None)
    }

    /// Layer the sources. `env` replaces the process environment when set.
    fn build(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, SettingsError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(false));
        }
        let settings: Self = builder
            .add_source(
                Environment::with_prefix("ORBIT")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the client cannot run with.
    ///
    /// # Errors
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.ws_base_url.starts_with("ws://") || self.ws_base_url.starts_with("wss://")) {
            return Err(SettingsError::Invalid {
                field: "ws_base_url",
                reason: format!("expected ws:// or wss:// URL, got {}", self.ws_base_url),
            });
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(SettingsError::Invalid {
                field: "api_base_url",
                reason: format!("expected http:// or https:// URL, got {}", self.api_base_url),
            });
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "reconnect_base_delay_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "heartbeat_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Notification socket URL for a user.
    #[must_use]
    pub fn ws_url_for(&self, user_id: &str) -> String {
        format!("{}/ws/{user_id}", self.ws_base_url.trim_end_matches('/'))
    }

    /// REST URL for an API path such as `/api/login`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Settings error.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
