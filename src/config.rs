use crate::audio::encoder::PcmFormat;
use crate::defaults;
use crate::error::{PromtuneError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub prometheus: PrometheusConfig,
    pub range: RangeConfig,
    pub audio: AudioConfig,
}

/// Metrics server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrometheusConfig {
    pub url: Option<String>,
    pub query: Option<String>,
    /// Resolution step of every range query
    #[serde(with = "humantime_duration")]
    pub scrape_interval: Duration,
}

/// Time range configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RangeConfig {
    /// How far back the range starts when no start time is given
    #[serde(with = "humantime_duration")]
    pub offset: Duration,
    /// Width of each queried window
    #[serde(with = "humantime_duration")]
    pub chunk: Duration,
    /// `YYYY-MM-DD HH:MM:SS` (UTC)
    pub start_time: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` (UTC)
    pub end_time: Option<String>,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub resample_quality: usize,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: None,
            query: None,
            scrape_interval: defaults::SCRAPE_INTERVAL,
        }
    }
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            offset: defaults::OFFSET,
            chunk: defaults::CHUNK,
            start_time: None,
            end_time: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            bits_per_sample: defaults::BITS_PER_SAMPLE,
            resample_quality: defaults::RESAMPLE_QUALITY,
        }
    }
}

impl AudioConfig {
    /// PCM layout of the encoded chunks.
    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(PromtuneError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PROMTUNE_URL → prometheus.url
    /// - PROMTUNE_QUERY → prometheus.query
    /// - PROMTUNE_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("PROMTUNE_URL")
            && !url.is_empty()
        {
            self.prometheus.url = Some(url);
        }

        if let Ok(query) = std::env::var("PROMTUNE_QUERY")
            && !query.is_empty()
        {
            self.prometheus.query = Some(query);
        }

        if let Ok(device) = std::env::var("PROMTUNE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/promtune/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("promtune")
            .join("config.toml")
    }

    /// Names of required settings that are unset or blank.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.prometheus.url) {
            missing.push("prometheus.url");
        }
        if blank(&self.prometheus.query) {
            missing.push("prometheus.query");
        }
        missing
    }

    /// Check value ranges. Does not check required settings.
    pub fn validate(&self) -> Result<()> {
        if self.range.chunk.is_zero() {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "range.chunk".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.prometheus.scrape_interval.is_zero() {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "prometheus.scrape_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        self.audio.pcm_format().validate()?;
        if !(1..=defaults::MAX_RESAMPLE_QUALITY).contains(&self.audio.resample_quality) {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.resample_quality".to_string(),
                message: format!(
                    "must be in 1..={}, got {}",
                    defaults::MAX_RESAMPLE_QUALITY,
                    self.audio.resample_quality
                ),
            });
        }
        Ok(())
    }
}

/// Serde adapter for humantime duration strings ("1s", "24h", "1m 30s").
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_promtune_env() {
        remove_env("PROMTUNE_URL");
        remove_env("PROMTUNE_QUERY");
        remove_env("PROMTUNE_AUDIO_DEVICE");
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.prometheus.url, None);
        assert_eq!(config.prometheus.query, None);
        assert_eq!(config.prometheus.scrape_interval, Duration::from_secs(1));

        assert_eq!(config.range.offset, Duration::from_secs(86400));
        assert_eq!(config.range.chunk, Duration::from_secs(60));
        assert_eq!(config.range.start_time, None);

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.bits_per_sample, 8);
        assert_eq!(config.audio.resample_quality, 4);
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_config(
            r#"
            [prometheus]
            url = "http://localhost:9090"
            query = "rate(node_cpu_seconds_total[1m])"
            scrape_interval = "15s"

            [range]
            offset = "2h"
            chunk = "5m"
            start_time = "2024-01-02 15:04:05"
            end_time = "2024-01-02 16:04:05"

            [audio]
            device = "pipewire"
            sample_rate = 22050
            channels = 2
            bits_per_sample = 16
            resample_quality = 2
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(
            config.prometheus.url.as_deref(),
            Some("http://localhost:9090")
        );
        assert_eq!(
            config.prometheus.query.as_deref(),
            Some("rate(node_cpu_seconds_total[1m])")
        );
        assert_eq!(config.prometheus.scrape_interval, Duration::from_secs(15));

        assert_eq!(config.range.offset, Duration::from_secs(7200));
        assert_eq!(config.range.chunk, Duration::from_secs(300));
        assert_eq!(
            config.range.start_time.as_deref(),
            Some("2024-01-02 15:04:05")
        );
        assert_eq!(
            config.range.end_time.as_deref(),
            Some("2024-01-02 16:04:05")
        );

        assert_eq!(config.audio.device.as_deref(), Some("pipewire"));
        assert_eq!(
            config.audio.pcm_format(),
            PcmFormat {
                sample_rate: 22050,
                channels: 2,
                bits_per_sample: 16,
            }
        );
        assert_eq!(config.audio.resample_quality, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_config(
            r#"
            [range]
            chunk = "30s"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.range.chunk, Duration::from_secs(30));
        assert_eq!(config.range.offset, defaults::OFFSET);
        assert_eq!(config.prometheus, PrometheusConfig::default());
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_invalid_duration_returns_error() {
        let temp_file = write_config(
            r#"
            [range]
            chunk = "soon"
        "#,
        );

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(PromtuneError::Config(_))
        ));
    }

    #[test]
    fn test_durations_serialize_as_humantime() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert!(text.contains("chunk = \"1m\""), "{}", text);
        assert!(text.contains("offset = \"1day\""), "{}", text);

        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }

    #[test]
    fn test_env_override_url_and_query() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_promtune_env();

        set_env("PROMTUNE_URL", "http://prom:9090");
        set_env("PROMTUNE_QUERY", "up");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.prometheus.url.as_deref(), Some("http://prom:9090"));
        assert_eq!(config.prometheus.query.as_deref(), Some("up"));
        assert_eq!(config.audio.device, None); // Not overridden

        clear_promtune_env();
    }

    #[test]
    fn test_env_override_device() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_promtune_env();

        set_env("PROMTUNE_AUDIO_DEVICE", "pulse");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device.as_deref(), Some("pulse"));

        clear_promtune_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_promtune_env();

        set_env("PROMTUNE_QUERY", "");
        let mut config = Config::default();
        config.prometheus.query = Some("up".to_string());
        let config = config.with_env_overrides();

        assert_eq!(config.prometheus.query.as_deref(), Some("up"));

        clear_promtune_env();
    }

    #[test]
    fn test_missing_settings() {
        let mut config = Config::default();
        assert_eq!(
            config.missing_settings(),
            vec!["prometheus.url", "prometheus.query"]
        );

        config.prometheus.url = Some("http://localhost:9090".to_string());
        config.prometheus.query = Some("   ".to_string());
        assert_eq!(config.missing_settings(), vec!["prometheus.query"]);

        config.prometheus.query = Some("up".to_string());
        assert!(config.missing_settings().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.range.chunk = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.prometheus.scrape_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.bits_per_sample = 24;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.resample_quality = 65;
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_config(
            r#"
            [audio
            device = "broken
        "#,
        );

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("promtune"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();

        assert_eq!(config, Config::default());
    }
}
