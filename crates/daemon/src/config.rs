use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockMediaBackend {
    /// Live Pexels search, falling back to the built-in catalog on any failure.
    Pexels,
    /// Built-in catalog only.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionBackend {
    Whisper,
    Fixture,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub log_level: LevelFilter,
    pub stock_media_backend: StockMediaBackend,
    pub pexels_api_key: Option<String>,
    pub stock_media_timeout: Duration,
    pub transcription_backend: TranscriptionBackend,
    pub openai_api_key: Option<String>,
    pub transcription_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr = get("SCRIPTREEL_BIND")
            .unwrap_or_else(|| "127.0.0.1:7777".to_string())
            .parse()
            .context("SCRIPTREEL_BIND is not a socket address")?;

        let log_level = match get("LOG_LEVEL") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("LOG_LEVEL '{}' is not a tracing level", value))?,
            None => LevelFilter::INFO,
        };

        let stock_media_backend = match get("STOCK_MEDIA_BACKEND").as_deref() {
            None | Some("pexels") => StockMediaBackend::Pexels,
            Some("fallback") => StockMediaBackend::Fallback,
            Some(other) => bail!("Unknown STOCK_MEDIA_BACKEND '{}'", other),
        };

        let transcription_backend = match get("TRANSCRIPTION_BACKEND").as_deref() {
            None | Some("whisper") => TranscriptionBackend::Whisper,
            Some("fixture") => TranscriptionBackend::Fixture,
            Some(other) => bail!("Unknown TRANSCRIPTION_BACKEND '{}'", other),
        };

        Ok(Config {
            bind_addr,
            db_path: get("SCRIPTREEL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".cache/scriptreel.db")),
            upload_dir: get("SCRIPTREEL_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".cache/uploads")),
            log_level,
            stock_media_backend,
            pexels_api_key: get("PEXELS_API_KEY"),
            stock_media_timeout: Duration::from_secs(parse_number(
                get("STOCK_MEDIA_TIMEOUT_SECS"),
                "STOCK_MEDIA_TIMEOUT_SECS",
                10,
            )?),
            transcription_backend,
            openai_api_key: get("OPENAI_API_KEY"),
            transcription_timeout: Duration::from_secs(parse_number(
                get("TRANSCRIPTION_TIMEOUT_SECS"),
                "TRANSCRIPTION_TIMEOUT_SECS",
                15,
            )?),
            max_upload_bytes: parse_number(get("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", 100 * 1024 * 1024)?,
        })
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a non-negative integer, got '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:7777");
        assert_eq!(config.db_path, PathBuf::from(".cache/scriptreel.db"));
        assert_eq!(config.log_level, LevelFilter::INFO);
        assert_eq!(config.stock_media_backend, StockMediaBackend::Pexels);
        assert_eq!(config.transcription_backend, TranscriptionBackend::Whisper);
        assert_eq!(config.stock_media_timeout, Duration::from_secs(10));
        assert_eq!(config.transcription_timeout, Duration::from_secs(15));
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert!(config.pexels_api_key.is_none());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = config_from(&[
            ("SCRIPTREEL_BIND", "0.0.0.0:9000"),
            ("LOG_LEVEL", "debug"),
            ("STOCK_MEDIA_BACKEND", "fallback"),
            ("TRANSCRIPTION_BACKEND", "fixture"),
            ("PEXELS_API_KEY", "key"),
            ("STOCK_MEDIA_TIMEOUT_SECS", "3"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.log_level, LevelFilter::DEBUG);
        assert_eq!(config.stock_media_backend, StockMediaBackend::Fallback);
        assert_eq!(config.transcription_backend, TranscriptionBackend::Fixture);
        assert_eq!(config.pexels_api_key.as_deref(), Some("key"));
        assert_eq!(config.stock_media_timeout, Duration::from_secs(3));
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let config = config_from(&[("PEXELS_API_KEY", "  ")]).unwrap();
        assert!(config.pexels_api_key.is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("STOCK_MEDIA_BACKEND", "unsplash")]).is_err());
        assert!(config_from(&[("TRANSCRIPTION_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("SCRIPTREEL_BIND", "localhost")]).is_err());
        assert!(config_from(&[("LOG_LEVEL", "loud")]).is_err());
    }
}
