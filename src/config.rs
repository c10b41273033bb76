//! Configuration management for `PollenCast`
//!
//! Handles loading configuration from files and environment variables and
//! validates every setting. Each state manager receives its own section at
//! construction; nothing reads configuration from global state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::PollenCastError;
use crate::risk::{CategoryWeights, MAX_ADVISORIES};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollenCastConfig {
    /// Pollen and geocoding API settings
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub sensitivity: SensitivityConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Pollen API key
    pub api_key: Option<String>,
    /// Base URL for the pollen API
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// Base URL for place search
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for transient failures
    #[serde(default = "default_provider_max_retries")]
    pub max_retries: u32,
}

/// Location State Manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Detected moves shorter than this are treated as GPS jitter
    #[serde(default = "default_significant_change_m")]
    pub significant_change_m: f64,
    /// Saved locations closer than this are the same place
    #[serde(default = "default_saved_dedup_m")]
    pub saved_dedup_m: f64,
    #[serde(default = "default_max_saved_locations")]
    pub max_saved_locations: usize,
    #[serde(default = "default_detection_timeout")]
    pub detection_timeout_seconds: u32,
    /// Oldest cached platform fix accepted
    #[serde(default = "default_maximum_position_age")]
    pub maximum_position_age_seconds: u32,
    #[serde(default)]
    pub high_accuracy: bool,
    #[serde(default = "default_permission_poll")]
    pub permission_poll_seconds: u32,
}

/// Sensitivity State Manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityConfig {
    /// Quiet period before an edit is auto-saved
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,
}

/// Forecast Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_forecast_days")]
    pub days: u32,
    /// Forecast data is re-fetched once the user moves further than this
    #[serde(default = "default_refresh_distance_m")]
    pub refresh_distance_m: f64,
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u32,
    #[serde(default = "default_max_advisories")]
    pub max_advisories: usize,
    #[serde(default)]
    pub weights: CategoryWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Settings database directory
    #[serde(default = "default_storage_path")]
    pub path: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_provider_base_url() -> String {
    "https://pollen.googleapis.com/v1".to_string()
}

fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_provider_timeout() -> u32 {
    10
}

fn default_provider_max_retries() -> u32 {
    3
}

fn default_significant_change_m() -> f64 {
    1000.0
}

fn default_saved_dedup_m() -> f64 {
    100.0
}

fn default_max_saved_locations() -> usize {
    10
}

fn default_detection_timeout() -> u32 {
    10
}

fn default_maximum_position_age() -> u32 {
    300
}

fn default_permission_poll() -> u32 {
    30
}

fn default_debounce_ms() -> u64 {
    800
}

fn default_auto_save() -> bool {
    true
}

fn default_forecast_days() -> u32 {
    3
}

fn default_refresh_distance_m() -> f64 {
    5000.0
}

fn default_max_age_minutes() -> u32 {
    60
}

fn default_max_advisories() -> usize {
    MAX_ADVISORIES
}

fn default_storage_path() -> String {
    ".pollencast".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_provider_base_url(),
            geocoding_url: default_geocoding_url(),
            timeout_seconds: default_provider_timeout(),
            max_retries: default_provider_max_retries(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            significant_change_m: default_significant_change_m(),
            saved_dedup_m: default_saved_dedup_m(),
            max_saved_locations: default_max_saved_locations(),
            detection_timeout_seconds: default_detection_timeout(),
            maximum_position_age_seconds: default_maximum_position_age(),
            high_accuracy: false,
            permission_poll_seconds: default_permission_poll(),
        }
    }
}

impl LocationConfig {
    #[must_use]
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_secs(self.detection_timeout_seconds.into())
    }

    #[must_use]
    pub fn maximum_position_age(&self) -> Duration {
        Duration::from_secs(self.maximum_position_age_seconds.into())
    }

    #[must_use]
    pub fn permission_poll_interval(&self) -> Duration {
        Duration::from_secs(self.permission_poll_seconds.into())
    }
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            auto_save: default_auto_save(),
        }
    }
}

impl SensitivityConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            days: default_forecast_days(),
            refresh_distance_m: default_refresh_distance_m(),
            max_age_minutes: default_max_age_minutes(),
            max_advisories: default_max_advisories(),
            weights: CategoryWeights::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PollenCastConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from the given path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(Self::get_config_path);

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // POLLENCAST__PROVIDER__API_KEY, POLLENCAST__SENSITIVITY__DEBOUNCE_MS, ...
        builder = builder.add_source(
            Environment::with_prefix("POLLENCAST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: PollenCastConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Default configuration file path
    #[must_use]
    pub fn get_config_path() -> PathBuf {
        PathBuf::from("pollencast.toml")
    }

    /// Replace zero or empty values with their defaults
    pub fn apply_defaults(&mut self) {
        if self.provider.base_url.is_empty() {
            self.provider.base_url = default_provider_base_url();
        }
        if self.provider.geocoding_url.is_empty() {
            self.provider.geocoding_url = default_geocoding_url();
        }
        if self.provider.timeout_seconds == 0 {
            self.provider.timeout_seconds = default_provider_timeout();
        }
        if self.location.detection_timeout_seconds == 0 {
            self.location.detection_timeout_seconds = default_detection_timeout();
        }
        if self.location.permission_poll_seconds == 0 {
            self.location.permission_poll_seconds = default_permission_poll();
        }
        if self.location.max_saved_locations == 0 {
            self.location.max_saved_locations = default_max_saved_locations();
        }
        if self.forecast.days == 0 {
            self.forecast.days = default_forecast_days();
        }
        if self.storage.path.is_empty() {
            self.storage.path = default_storage_path();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.provider.timeout_seconds > 120 {
            return Err(PollenCastError::config("Provider timeout cannot exceed 120 seconds").into());
        }

        if self.provider.max_retries > 10 {
            return Err(PollenCastError::config("Maximum retries cannot exceed 10").into());
        }

        if !(self.location.significant_change_m > 0.0) {
            return Err(PollenCastError::config(
                "Significant change threshold must be greater than 0 meters",
            )
            .into());
        }

        if self.location.saved_dedup_m < 0.0 {
            return Err(PollenCastError::config("Saved location dedup radius cannot be negative").into());
        }

        if self.location.max_saved_locations > 100 {
            return Err(PollenCastError::config("Maximum saved locations cannot exceed 100").into());
        }

        if !(800..=1000).contains(&self.sensitivity.debounce_ms) {
            return Err(PollenCastError::config(
                "Sensitivity debounce must be between 800 and 1000 ms",
            )
            .into());
        }

        if !(1..=5).contains(&self.forecast.days) {
            return Err(PollenCastError::config("Forecast days must be between 1 and 5").into());
        }

        if !(self.forecast.refresh_distance_m > 0.0) {
            return Err(PollenCastError::config(
                "Forecast refresh distance must be greater than 0 meters",
            )
            .into());
        }

        let weights = self.forecast.weights;
        let all = [weights.tree, weights.grass, weights.weed];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(PollenCastError::config("Category weights cannot be negative").into());
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(PollenCastError::config("At least one category weight must be positive").into());
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(PollenCastError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(PollenCastError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("Pollen API", &self.provider.base_url),
            ("Geocoding API", &self.provider.geocoding_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(PollenCastError::config(format!(
                    "{name} base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollenCastConfig::default();
        assert_eq!(config.provider.base_url, "https://pollen.googleapis.com/v1");
        assert_eq!(config.location.significant_change_m, 1000.0);
        assert_eq!(config.location.saved_dedup_m, 100.0);
        assert_eq!(config.location.max_saved_locations, 10);
        assert_eq!(config.sensitivity.debounce(), Duration::from_millis(800));
        assert_eq!(config.forecast.days, 3);
        assert_eq!(config.forecast.refresh_distance_m, 5000.0);
        assert_eq!(config.forecast.max_age_minutes, 60);
        assert_eq!(config.forecast.weights, CategoryWeights::default());
        assert!(config.provider.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = PollenCastConfig::default();
        config.logging.level = "invalid".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_numeric_ranges() {
        let mut config = PollenCastConfig::default();
        config.provider.timeout_seconds = 500;
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("timeout cannot exceed"));

        let mut config = PollenCastConfig::default();
        config.sensitivity.debounce_ms = 10;
        assert!(config.validate().is_err());

        config.sensitivity.debounce_ms = 1500;
        assert!(config.validate().is_err());

        config.sensitivity.debounce_ms = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_weights() {
        let mut config = PollenCastConfig::default();
        config.forecast.weights = CategoryWeights {
            tree: 0.0,
            grass: 0.0,
            weed: 0.0,
        };
        assert!(config.validate().is_err());

        config.forecast.weights.grass = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_defaults_fills_zeroes() {
        let mut config = PollenCastConfig::default();
        config.forecast.days = 0;
        config.logging.format = String::new();
        config.apply_defaults();
        assert_eq!(config.forecast.days, 3);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("pollencast-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[provider]\napi_key = \"file_key\"\n\n[forecast]\ndays = 5\n",
        )
        .unwrap();

        let config = PollenCastConfig::load_from_path(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.provider.api_key.as_deref(), Some("file_key"));
        assert_eq!(config.forecast.days, 5);
        assert_eq!(config.location.significant_change_m, 1000.0);
        assert_eq!(config.sensitivity.debounce_ms, 800);
    }
}
