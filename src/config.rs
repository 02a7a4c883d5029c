//! Configuration for delivery timing, the asset cache and the HTTP front.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed-interval retry policy: how often to retry and how many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay between attempts in milliseconds.
    pub interval_ms: u64,
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy with the given interval and attempt cap.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
        }
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Sets the delay between attempts.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the attempt cap.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Total time covered by the policy if every attempt fails.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        Duration::from_millis(self.interval_ms.saturating_mul(self.max_attempts as u64))
    }
}

/// Timing for the native-to-web file hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Retry policy while the rendering surface does not exist yet.
    pub surface: RetryPolicy,
    /// Retry policy while the web content has not defined the bridge.
    pub bridge: RetryPolicy,
    /// How long to wait for the web content to acknowledge a state reset.
    pub reset_timeout_ms: u64,
    /// Settle delay before re-entering delivery on resume or after reload.
    pub settle_delay_ms: u64,
    /// Delay before handling a file the app was cold-launched with.
    pub launch_delay_ms: u64,
    /// Delay before handling a file opened while the app is running.
    pub open_delay_ms: u64,
    /// Whether to reload the web content once the bridge policy is exhausted.
    pub reload_on_exhaustion: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            surface: RetryPolicy::new(Duration::from_millis(500), 20),
            bridge: RetryPolicy::new(Duration::from_millis(100), 50),
            reset_timeout_ms: 300,
            settle_delay_ms: 500,
            launch_delay_ms: 1000,
            open_delay_ms: 500,
            reload_on_exhaustion: true,
        }
    }
}

impl DeliveryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the surface retry policy.
    #[must_use]
    pub const fn with_surface_policy(mut self, policy: RetryPolicy) -> Self {
        self.surface = policy;
        self
    }

    /// Sets the bridge polling policy.
    #[must_use]
    pub const fn with_bridge_policy(mut self, policy: RetryPolicy) -> Self {
        self.bridge = policy;
        self
    }

    /// Sets the reset acknowledgement timeout.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the resume/reload settle delay.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets both launch-source delays.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_entry_delays(mut self, launch: Duration, open: Duration) -> Self {
        self.launch_delay_ms = launch.as_millis() as u64;
        self.open_delay_ms = open.as_millis() as u64;
        self
    }

    /// Sets whether exhausting the bridge policy reloads the web content.
    #[must_use]
    pub const fn with_reload_on_exhaustion(mut self, reload: bool) -> Self {
        self.reload_on_exhaustion = reload;
        self
    }

    #[must_use]
    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Versioned asset cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache name; changing it invalidates every older cache on activation.
    pub version: String,
    /// Paths pre-fetched into the cache on install.
    pub manifest: Vec<String>,
    /// Shell document served when nothing else matches offline.
    pub root_document: String,
    /// Document rewritten to embed a shared file.
    pub share_handler: String,
    /// Upstream origin that network fetches are resolved against.
    pub origin: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "html-viewer-v2".to_string(),
            manifest: vec![
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/share-handler.html".to_string(),
            ],
            root_document: "/index.html".to_string(),
            share_handler: "/share-handler.html".to_string(),
            origin: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl CacheConfig {
    /// Sets the cache version string.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the upstream origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// HTTP front configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Largest share-target request body accepted, in bytes.
    pub max_share_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9724,
            max_share_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Sets the share-target body limit.
    #[must_use]
    pub const fn with_max_share_bytes(mut self, max_share_bytes: usize) -> Self {
        self.max_share_bytes = max_share_bytes;
        self
    }
}

/// Complete shell configuration, persisted as TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub delivery: DeliveryConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

impl ShellConfig {
    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("viewer-shell")
            .join("config.toml")
    }

    /// Loads a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads a config file, writing the default template first if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be written or the file cannot
    /// be parsed.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Saves the config atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, toml_str)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
