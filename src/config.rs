//! gliff SDK - Configuration
//!
//! Store credentials and SDK tuning. Explicit values (a JSON config file or
//! the constructor) take priority, then `STORE_*` environment variables fill
//! whatever is still unset.

use std::fmt;
use std::path::Path;

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use crate::error::{GliffError, GliffResult};

pub const ENV_SERVER_URL: &str = "STORE_SERVER_URL";
pub const ENV_USERNAME: &str = "STORE_USERNAME";
pub const ENV_PASSWORD: &str = "STORE_PASSWORD";

/// Longest side of a tile thumbnail, in pixels
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 128;

/// Gallery commit retries after a lost race
pub const DEFAULT_COMMIT_RETRIES: u32 = 3;

/// SDK configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Store server URL
    pub server_url: String,
    /// Store account name
    pub username: String,
    /// Store account password
    pub password: Secret<String>,
    /// Client name reported to the store
    pub client_name: String,
    /// Gallery commit retries before giving up
    pub max_commit_retries: u32,
    /// Max thumbnail side
    pub thumbnail_size: u32,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            password: Secret::new(String::new()),
            client_name: "gliff-sdk".into(),
            max_commit_retries: DEFAULT_COMMIT_RETRIES,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }
}

impl fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("client_name", &self.client_name)
            .field("max_commit_retries", &self.max_commit_retries)
            .field("thumbnail_size", &self.thumbnail_size)
            .finish()
    }
}

impl SdkConfig {
    pub fn new(server_url: &str, username: &str, password: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            username: username.to_string(),
            password: Secret::new(password.to_string()),
            ..Default::default()
        }
    }

    /// Read all credentials from the environment
    pub fn from_env() -> GliffResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load a JSON config file
    pub fn from_file(path: &Path) -> GliffResult<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| GliffError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Fill unset credentials from the environment
    pub fn with_env_fallback(self) -> Self {
        self.fill_from(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> GliffResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GliffError::Config(format!("{} not found.", name)))
        };

        Ok(Self {
            server_url: require(ENV_SERVER_URL)?,
            username: require(ENV_USERNAME)?,
            password: Secret::new(require(ENV_PASSWORD)?),
            ..Default::default()
        })
    }

    fn fill_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.server_url.is_empty() {
            self.server_url = lookup(ENV_SERVER_URL).unwrap_or_default();
        }
        if self.username.is_empty() {
            self.username = lookup(ENV_USERNAME).unwrap_or_default();
        }
        if self.password.expose_secret().is_empty() {
            if let Some(password) = lookup(ENV_PASSWORD) {
                self.password = Secret::new(password);
            }
        }
        self
    }

    /// Check the settings needed to log in
    pub fn validate(&self) -> GliffResult<()> {
        if self.server_url.is_empty() {
            return Err(GliffError::Config("server_url is not set".into()));
        }
        if self.username.is_empty() {
            return Err(GliffError::Config("username is not set".into()));
        }
        if self.thumbnail_size == 0 {
            return Err(GliffError::Config("thumbnail_size must be positive".into()));
        }
        Ok(())
    }
}
