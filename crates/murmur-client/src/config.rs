//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the client starts with zero
//! configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use murmur_shared::constants::{ERROR_DISPLAY_MS, MAX_ATTACHMENT_SIZE, PROGRESS_TICK_MS};
use murmur_shared::MurmurError;
use murmur_store::Database;

/// How attachment bodies travel with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentMode {
    /// Embedded base64 `data:` URI with cosmetic progress.
    DataUri,
    /// Chunked upload to the content-addressed blob store, referenced by
    /// digest, with byte-accurate progress.
    BlobStore,
}

impl FromStr for AttachmentMode {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data-uri" | "datauri" | "data" => Ok(Self::DataUri),
            "blob" | "blob-store" => Ok(Self::BlobStore),
            other => Err(MurmurError::Validation(format!(
                "unknown attachment mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Local provider database file.
    /// Env: `MURMUR_DB_PATH`
    /// Default: `None` (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Env: `MURMUR_ATTACHMENT_MODE` (`data-uri` / `blob`)
    /// Default: `data-uri`
    pub attachment_mode: AttachmentMode,

    /// Largest accepted attachment.
    /// Env: `MURMUR_MAX_ATTACHMENT_BYTES`
    /// Default: 50 MiB
    pub max_attachment_bytes: usize,

    /// Period of the synthetic upload progress.
    /// Env: `MURMUR_PROGRESS_TICK_MS`
    /// Default: 200 ms
    pub progress_tick: Duration,

    /// How long the recorder shows an error before returning to idle.
    /// Env: `MURMUR_ERROR_DISPLAY_MS`
    /// Default: 3000 ms
    pub error_display: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            attachment_mode: AttachmentMode::DataUri,
            max_attachment_bytes: MAX_ATTACHMENT_SIZE,
            progress_tick: Duration::from_millis(PROGRESS_TICK_MS),
            error_display: Duration::from_millis(ERROR_DISPLAY_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("MURMUR_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(mode) = lookup("MURMUR_ATTACHMENT_MODE") {
            match mode.parse() {
                Ok(parsed) => config.attachment_mode = parsed,
                Err(e) => tracing::warn!(value = %mode, error = %e, "Invalid MURMUR_ATTACHMENT_MODE, using default"),
            }
        }

        if let Some(val) = lookup("MURMUR_MAX_ATTACHMENT_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_attachment_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid MURMUR_MAX_ATTACHMENT_BYTES, using default"),
            }
        }

        if let Some(val) = lookup("MURMUR_PROGRESS_TICK_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.progress_tick = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid MURMUR_PROGRESS_TICK_MS, using default"),
            }
        }

        if let Some(val) = lookup("MURMUR_ERROR_DISPLAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.error_display = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid MURMUR_ERROR_DISPLAY_MS, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// The configured database file, or the platform default.
    pub fn resolve_database_path(&self) -> murmur_shared::Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Database::default_path().map_err(MurmurError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.attachment_mode, AttachmentMode::DataUri);
        assert_eq!(config.max_attachment_bytes, 50 * 1024 * 1024);
        assert_eq!(config.progress_tick, Duration::from_millis(200));
        assert_eq!(config.error_display, Duration::from_secs(3));
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_vars(vars(&[
            ("MURMUR_DB_PATH", "/tmp/m.db"),
            ("MURMUR_ATTACHMENT_MODE", "blob"),
            ("MURMUR_MAX_ATTACHMENT_BYTES", "1024"),
            ("MURMUR_PROGRESS_TICK_MS", "50"),
            ("MURMUR_ERROR_DISPLAY_MS", "0"),
        ]));
        assert_eq!(config.resolve_database_path().unwrap(), PathBuf::from("/tmp/m.db"));
        assert_eq!(config.attachment_mode, AttachmentMode::BlobStore);
        assert_eq!(config.max_attachment_bytes, 1024);
        assert_eq!(config.progress_tick, Duration::from_millis(50));
        assert_eq!(config.error_display, Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ClientConfig::from_vars(vars(&[
            ("MURMUR_ATTACHMENT_MODE", "carrier-pigeon"),
            ("MURMUR_MAX_ATTACHMENT_BYTES", "0"),
            ("MURMUR_PROGRESS_TICK_MS", "fast"),
        ]));
        assert_eq!(config.attachment_mode, AttachmentMode::DataUri);
        assert_eq!(config.max_attachment_bytes, MAX_ATTACHMENT_SIZE);
        assert_eq!(config.progress_tick, Duration::from_millis(PROGRESS_TICK_MS));
    }
}
