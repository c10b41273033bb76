//! `PollenCast` - Personalized pollen risk forecasts
//!
//! This library turns raw daily pollen index data into a personalized risk
//! assessment and keeps it synchronized with the user's location and
//! self-reported sensitivity profile.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod error;
pub mod forecast;
pub mod geo;
pub mod location_manager;
pub mod logging;
pub mod models;
pub mod providers;
pub mod risk;
pub mod sensitivity_manager;
pub mod session;
pub mod storage;
pub mod trend;

// Re-export core types for public API
pub use config::PollenCastConfig;
pub use error::{ForecastError, LocationError, PollenCastError, SensitivityError};
pub use forecast::{FetchOutcome, ForecastOrchestrator, ForecastSnapshot};
pub use geo::distance_meters;
pub use location_manager::{DetectOutcome, LocationEvent, LocationManager, LocationSnapshot};
pub use models::{
    Coordinates, Location, LocationSettings, LocationSource, PlaceResult, PollenCategory,
    RawDailyMeasurement, RiskLevel, RiskResult, SensitivityProfile, SensitivityUpdate,
};
pub use risk::{
    CategoryWeights, RiskEngine, calculate_category_score, calculate_personalized_risk,
    classify_risk_level,
};
pub use sensitivity_manager::{SaveOutcome, SensitivityEvent, SensitivityManager, SensitivitySnapshot};
pub use session::PollenSession;
pub use storage::{FjallStore, MemoryStore};
pub use trend::{ActivityRecommendation, Trend, TrendDirection, TrendMagnitude};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, PollenCastError>;

/// State locks are never held across an await, so a poisoned lock still holds consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
