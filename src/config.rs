//! Configuration file parser for {config_dir}/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown top-level keys are accepted by serde but logged as warnings to
//! catch typos.

use chrono::NaiveTime;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid digest_time '{0}': expected HH:MM")]
    InvalidDigestTime(String),
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified; missing keys fall back to the defaults below.
///
/// Custom Debug impl masks the summarizer API key so it never leaks
/// into logs or error output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Only keep articles published within this many hours.
    pub lookback_hours: u64,

    /// Cap on stored articles per feed per run (0 = unlimited).
    pub max_articles_per_feed: u64,

    /// Maximum number of feeds fetched concurrently.
    pub fetch_concurrency: usize,

    /// Time of day (UTC, "HH:MM") at which `watch` runs the daily digest.
    pub digest_time: String,

    /// Hours between scheduled refreshes in `watch` mode (0 = daily only).
    pub refresh_interval_hours: u64,

    /// Base URL of the reader service used for article text extraction.
    pub reader_base_url: String,

    /// Hosted summarization settings.
    pub summarizer: SummarizerConfig,
}

/// Settings for the hosted chat-completions summarizer.
///
/// When `api_key` is absent (both here and in the `NEWSBRIEF_API_KEY`
/// environment variable) summarization falls back to the local
/// extractive method.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Full URL of an OpenAI-compatible chat completions endpoint.
    pub api_base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    pub temperature: f32,

    pub timeout_seconds: u64,

    /// Article content is truncated to this many characters before
    /// being sent to the model.
    pub max_input_chars: usize,

    /// API key (alternative to the NEWSBRIEF_API_KEY env var).
    /// The env var takes precedence over the config file.
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            max_articles_per_feed: 15,
            fetch_concurrency: 10,
            digest_time: "08:00".to_string(),
            refresh_interval_hours: 4,
            reader_base_url: "https://r.jina.ai".to_string(),
            summarizer: SummarizerConfig::default(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout_seconds: 60,
            max_input_chars: 12_000,
            api_key: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("lookback_hours", &self.lookback_hours)
            .field("max_articles_per_feed", &self.max_articles_per_feed)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("digest_time", &self.digest_time)
            .field("refresh_interval_hours", &self.refresh_interval_hours)
            .field("reader_base_url", &self.reader_base_url)
            .field("summarizer", &self.summarizer)
            .finish()
    }
}

impl std::fmt::Debug for SummarizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerConfig")
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_input_chars", &self.max_input_chars)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Size check before reading guards against a corrupted or
        // maliciously large file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "lookback_hours",
                "max_articles_per_feed",
                "fetch_concurrency",
                "digest_time",
                "refresh_interval_hours",
                "reader_base_url",
                "summarizer",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.digest_time()?; // fail fast on a bad time string
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse `digest_time` into a [`NaiveTime`].
    pub fn digest_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.digest_time, "%H:%M")
            .map_err(|_| ConfigError::InvalidDigestTime(self.digest_time.clone()))
    }

    /// Resolve the summarizer API key: env var first, then config file.
    pub fn summarizer_api_key(&self) -> Option<secrecy::SecretString> {
        std::env::var("NEWSBRIEF_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.summarizer.api_key.clone())
            .map(secrecy::SecretString::from)
    }

    /// Optional API key for the reader service, env-only.
    pub fn reader_api_key(&self) -> Option<secrecy::SecretString> {
        std::env::var("NEWSBRIEF_READER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(secrecy::SecretString::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.max_articles_per_feed, 15);
        assert_eq!(config.fetch_concurrency, 10);
        assert_eq!(config.digest_time, "08:00");
        assert_eq!(config.refresh_interval_hours, 4);
        assert_eq!(config.reader_base_url, "https://r.jina.ai");
        assert!(config.summarizer.api_key.is_none());
    }

    #[test]
    fn missing_file_returns_default() {
        let path = Path::new("/tmp/newsbrief_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.lookback_hours, 24);
    }

    #[test]
    fn empty_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.digest_time, "08:00");
    }

    #[test]
    fn partial_config_uses_defaults_for_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "lookback_hours = 48\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lookback_hours, 48);
        assert_eq!(config.max_articles_per_feed, 15); // default
        assert_eq!(config.refresh_interval_hours, 4); // default
    }

    #[test]
    fn full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let content = r#"
lookback_hours = 12
max_articles_per_feed = 5
fetch_concurrency = 4
digest_time = "06:30"
refresh_interval_hours = 2
reader_base_url = "https://reader.example.com"

[summarizer]
api_base_url = "https://router.huggingface.co/v1/chat/completions"
model = "facebook/bart-large-cnn"
temperature = 0.1
timeout_seconds = 30
max_input_chars = 4000
api_key = "test-key-123"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lookback_hours, 12);
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.digest_time().unwrap(), NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert_eq!(config.summarizer.model, "facebook/bart-large-cnn");
        assert_eq!(config.summarizer.max_input_chars, 4000);
        assert_eq!(config.summarizer.api_key.as_deref(), Some("test-key-123"));
    }

    #[test]
    fn invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_keys_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "lookback_hours = 6\ntotally_fake_key = true\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lookback_hours, 6);
    }

    #[test]
    fn invalid_digest_time_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "digest_time = \"25:99\"\n").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::InvalidDigestTime(_))));
    }

    #[test]
    fn too_large_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::TooLarge(_))));
    }

    #[test]
    fn debug_masks_api_key() {
        let mut config = Config::default();
        config.summarizer.api_key = Some("super-secret-key-12345".to_string());

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
