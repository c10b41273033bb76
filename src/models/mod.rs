//! Data models for `PollenCast`
//!
//! - Location: coordinates, saved places and persisted location settings
//! - Pollen: categories, sensitivity profiles and raw provider measurements
//! - Risk: personalized per-day risk results

pub mod location;
pub mod pollen;
pub mod risk;

pub use location::{Coordinates, Location, LocationSettings, LocationSource, PlaceResult};
pub use pollen::{
    CategoryMeasurement, IndexInfo, PollenCategory, RawDailyMeasurement, SensitivityProfile,
    SensitivityUpdate,
};
pub use risk::{CategoryRisk, RiskLevel, RiskResult};
