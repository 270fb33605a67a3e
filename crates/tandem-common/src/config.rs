//! Session tunables.
//!
//! Every interval is kept in milliseconds so the file and environment forms
//! stay plain integers. Use the `Duration` accessors at call sites.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Window that coalesces local dirty signals into one outgoing report.
    pub outgoing_sample_ms: u64,
    /// Tick on which a held inbound payload may be released.
    pub incoming_poll_ms: u64,
    /// Inbound payloads are held until this long after the last local edit.
    pub silence_after_editing_ms: u64,
    pub ping_interval_ms: u64,
    /// A connection with no pong for longer than this is considered stale.
    pub pong_threshold_ms: u64,
    /// Minimum time between two reconnect attempts.
    pub reconnect_cooldown_ms: u64,
    /// A socket handshake that takes longer than this counts as a failed connect.
    pub connect_timeout_ms: u64,
    /// A local language change wins over broadcasts for this long.
    pub language_grace_ms: u64,
    /// Number of presence colour buckets.
    pub color_buckets: u32,
    /// Base WebSocket URL; the session path is appended to it.
    pub server_url: String,
    /// Base HTTP URL for the initial session fetch.
    pub api_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            outgoing_sample_ms: 50,
            incoming_poll_ms: 100,
            silence_after_editing_ms: 1500,
            ping_interval_ms: 1000,
            pong_threshold_ms: 3000,
            reconnect_cooldown_ms: 6000,
            connect_timeout_ms: 5000,
            language_grace_ms: 500,
            color_buckets: 5,
            server_url: "ws://localhost:5000/api/".to_owned(),
            api_url: "http://localhost:5000/api/".to_owned(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, starting from defaults.
    ///
    /// Optional env vars:
    /// - `TANDEM_OUTGOING_SAMPLE_MS`, `TANDEM_INCOMING_POLL_MS`,
    ///   `TANDEM_SILENCE_AFTER_EDITING_MS`, `TANDEM_PING_INTERVAL_MS`,
    ///   `TANDEM_PONG_THRESHOLD_MS`, `TANDEM_RECONNECT_COOLDOWN_MS`,
    ///   `TANDEM_LANGUAGE_GRACE_MS`, `TANDEM_CONNECT_TIMEOUT_MS`: intervals in
    ///   milliseconds
    /// - `TANDEM_COLOR_BUCKETS`: number of presence colours
    /// - `TANDEM_SERVER_URL`, `TANDEM_API_URL`: base URLs
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let parse = |var: &'static str, field: &'static str, target: &mut u64| {
            override_with(&lookup, var, field, target)
        };
        parse("TANDEM_OUTGOING_SAMPLE_MS", "outgoing_sample_ms", &mut config.outgoing_sample_ms)?;
        parse("TANDEM_INCOMING_POLL_MS", "incoming_poll_ms", &mut config.incoming_poll_ms)?;
        parse(
            "TANDEM_SILENCE_AFTER_EDITING_MS",
            "silence_after_editing_ms",
            &mut config.silence_after_editing_ms,
        )?;
        parse("TANDEM_PING_INTERVAL_MS", "ping_interval_ms", &mut config.ping_interval_ms)?;
        parse("TANDEM_PONG_THRESHOLD_MS", "pong_threshold_ms", &mut config.pong_threshold_ms)?;
        parse(
            "TANDEM_RECONNECT_COOLDOWN_MS",
            "reconnect_cooldown_ms",
            &mut config.reconnect_cooldown_ms,
        )?;
        parse("TANDEM_LANGUAGE_GRACE_MS", "language_grace_ms", &mut config.language_grace_ms)?;
        parse("TANDEM_CONNECT_TIMEOUT_MS", "connect_timeout_ms", &mut config.connect_timeout_ms)?;
        override_with(&lookup, "TANDEM_COLOR_BUCKETS", "color_buckets", &mut config.color_buckets)?;

        if let Some(url) = lookup("TANDEM_SERVER_URL") {
            config.server_url = url;
        }
        if let Some(url) = lookup("TANDEM_API_URL") {
            config.api_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from the provided loader and validates it.
    pub async fn load(loader: &impl Loader) -> Result<Self, ConfigError> {
        let config = loader.load().await?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<(), ConfigError> {
        saver.save(self).await
    }

    /// Reject values that would stall or break the channel.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("outgoing_sample_ms", self.outgoing_sample_ms),
            ("incoming_poll_ms", self.incoming_poll_ms),
            ("ping_interval_ms", self.ping_interval_ms),
            ("pong_threshold_ms", self.pong_threshold_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "interval must be greater than zero".into(),
                });
            }
        }
        if self.color_buckets == 0 {
            return Err(ConfigError::InvalidValue {
                field: "color_buckets",
                message: "at least one colour bucket is required".into(),
            });
        }
        validate_base_url("server_url", &self.server_url, &["ws", "wss"])?;
        validate_base_url("api_url", &self.api_url, &["http", "https"])?;
        Ok(())
    }

    pub fn outgoing_sample(&self) -> Duration {
        Duration::from_millis(self.outgoing_sample_ms)
    }

    pub fn incoming_poll(&self) -> Duration {
        Duration::from_millis(self.incoming_poll_ms)
    }

    pub fn silence_after_editing(&self) -> Duration {
        Duration::from_millis(self.silence_after_editing_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_threshold(&self) -> Duration {
        Duration::from_millis(self.pong_threshold_ms)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooldown_ms)
    }

    pub fn language_grace(&self) -> Duration {
        Duration::from_millis(self.language_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn override_with<T: FromStr>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
    field: &'static str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(var) {
        *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field,
            message: format!("{var}={raw}: {e}"),
        })?;
    }
    Ok(())
}

fn validate_base_url(field: &'static str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        field,
        message: format!("{raw}: {e}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue {
            field,
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if !raw.ends_with('/') {
        return Err(ConfigError::InvalidValue {
            field,
            message: "base url must end with '/'".into(),
        });
    }
    Ok(())
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(&self) -> impl Future<Output = Result<SyncConfig, ConfigError>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(&self, config: &SyncConfig) -> impl Future<Output = Result<(), ConfigError>> + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// [`SyncConfig`] data will be serialized and deserialized based on the
    /// file extension, which must be `.json` or `.toml`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn format(&self) -> Result<Format, ConfigError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: self.path.display().to_string(),
            }),
        }
    }
}

enum Format {
    Json,
    Toml,
}

impl Loader for FileStore {
    async fn load(&self) -> Result<SyncConfig, ConfigError> {
        let format = self.format()?;
        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::MissingFile {
            path: self.path.display().to_string(),
            source,
        })?;
        let config = match format {
            Format::Json => serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?,
            Format::Toml => toml::from_str(&raw).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?,
        };
        tracing::debug!(path = %self.path.display(), "loaded sync configuration");
        Ok(config)
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &SyncConfig) -> Result<(), ConfigError> {
        let raw = match self.format()? {
            Format::Json => serde_json::to_string_pretty(config).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?,
            Format::Toml => toml::to_string_pretty(config).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?,
        };
        std::fs::write(&self.path, raw).map_err(|source| ConfigError::MissingFile {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.silence_after_editing(), Duration::from_millis(1500));
        assert_eq!(config.reconnect_cooldown(), Duration::from_secs(6));
    }

    #[test]
    fn test_env_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("TANDEM_PING_INTERVAL_MS", "250"),
            ("TANDEM_COLOR_BUCKETS", " 8 "),
            ("TANDEM_CONNECT_TIMEOUT_MS", "750"),
            ("TANDEM_SERVER_URL", "wss://collab.example/api/"),
        ]))
        .unwrap();
        assert_eq!(config.ping_interval_ms, 250);
        assert_eq!(config.color_buckets, 8);
        assert_eq!(config.connect_timeout(), Duration::from_millis(750));
        assert_eq!(config.server_url, "wss://collab.example/api/");
        assert_eq!(config.pong_threshold_ms, 3000);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = SyncConfig::from_lookup(lookup_from(&[("TANDEM_PONG_THRESHOLD_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "pong_threshold_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = SyncConfig {
            ping_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "ping_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = SyncConfig {
            server_url: "http://localhost/api/".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            api_url: "http://localhost/api".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["tandem.json", "tandem.toml"] {
            let store = FileStore::new(dir.path().join(name));
            let config = SyncConfig {
                silence_after_editing_ms: 900,
                color_buckets: 7,
                ..Default::default()
            };
            config.save(&store).await.unwrap();
            let loaded = SyncConfig::load(&store).await.unwrap();
            assert_eq!(loaded, config);
        }
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "pong_threshold_ms = 4000\n").unwrap();
        let loaded = SyncConfig::load(&FileStore::new(&path)).await.unwrap();
        assert_eq!(loaded.pong_threshold_ms, 4000);
        assert_eq!(loaded.ping_interval_ms, 1000);
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let err = SyncConfig::load(&FileStore::new("tandem.yaml")).await.unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }
}
