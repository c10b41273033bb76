//! Contracts for the external collaborators the state managers depend on
//!
//! The managers only see these traits. Concrete adapters live in the
//! submodules; tests supply their own.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, GeolocationError, StorageError};
use crate::models::{Coordinates, Location, PlaceResult, RawDailyMeasurement, SensitivityProfile};

pub mod google_pollen;
pub mod open_meteo;
pub mod unsupported;

pub use google_pollen::GooglePollenClient;
pub use open_meteo::OpenMeteoGeocoder;
pub use unsupported::UnsupportedDetector;

/// Daily pollen data source. Calls are assumed idempotent and side-effect free.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn fetch(
        &self,
        location: &Location,
        days: u32,
        cancel: CancellationToken,
    ) -> Result<Vec<RawDailyMeasurement>, FetchError>;
}

/// Options passed to a geolocation detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    pub timeout: Duration,
    pub high_accuracy: bool,
    /// Accept a cached platform fix no older than this
    pub maximum_age: Duration,
}

/// A raw fix from the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPosition {
    pub coordinates: Coordinates,
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    #[default]
    Unknown,
}

/// Platform position source
#[async_trait]
pub trait GeolocationDetector: Send + Sync {
    /// Whether the platform has a geolocation capability at all
    fn is_supported(&self) -> bool;

    /// Resolve the current position. Implementations should stop early and
    /// return `GeolocationError::Aborted` once `cancel` fires.
    async fn detect(
        &self,
        options: DetectOptions,
        cancel: CancellationToken,
    ) -> Result<DetectedPosition, GeolocationError>;

    async fn permission_state(&self) -> Result<PermissionState, GeolocationError>;
}

/// Free-text place lookup
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PlaceResult>, FetchError>;
}

/// Durable key-value persistence holding JSON strings
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Structural validation of a sensitivity profile, independent of normalization
pub trait ProfileValidator: Send + Sync {
    fn validate(&self, profile: &SensitivityProfile) -> Result<(), String>;
}

/// Accepts any profile whose fields are all within `[1, 10]`
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeValidator;

impl ProfileValidator for RangeValidator {
    fn validate(&self, profile: &SensitivityProfile) -> Result<(), String> {
        if profile.is_in_range() {
            Ok(())
        } else {
            Err(format!(
                "sensitivity values must be between 1 and 10, got {}",
                profile.request_key()
            ))
        }
    }
}
