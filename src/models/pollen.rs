//! Pollen categories, sensitivity profiles and raw provider measurements

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SensitivityError;

pub const MIN_SENSITIVITY: u8 = 1;
pub const MAX_SENSITIVITY: u8 = 10;
pub const DEFAULT_SENSITIVITY: u8 = 5;

/// The three pollen categories tracked per day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollenCategory {
    Tree,
    Grass,
    Weed,
}

impl PollenCategory {
    pub const ALL: [PollenCategory; 3] = [Self::Tree, Self::Grass, Self::Weed];

    /// Map a forecast provider pollen type code
    #[must_use]
    pub fn from_provider_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "TREE" => Some(Self::Tree),
            "GRASS" => Some(Self::Grass),
            "WEED" => Some(Self::Weed),
            _ => None,
        }
    }
}

impl fmt::Display for PollenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollenCategory::Tree => write!(f, "Tree"),
            PollenCategory::Grass => write!(f, "Grass"),
            PollenCategory::Weed => write!(f, "Weed"),
        }
    }
}

/// Per-category allergy sensitivity, each in `[1, 10]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityProfile {
    pub tree: u8,
    pub grass: u8,
    pub weed: u8,
}

impl Default for SensitivityProfile {
    fn default() -> Self {
        Self {
            tree: DEFAULT_SENSITIVITY,
            grass: DEFAULT_SENSITIVITY,
            weed: DEFAULT_SENSITIVITY,
        }
    }
}

impl SensitivityProfile {
    #[must_use]
    pub fn uniform(value: u8) -> Self {
        Self {
            tree: value,
            grass: value,
            weed: value,
        }
    }

    #[must_use]
    pub fn get(&self, category: PollenCategory) -> u8 {
        match category {
            PollenCategory::Tree => self.tree,
            PollenCategory::Grass => self.grass,
            PollenCategory::Weed => self.weed,
        }
    }

    pub fn set(&mut self, category: PollenCategory, value: u8) {
        match category {
            PollenCategory::Tree => self.tree = value,
            PollenCategory::Grass => self.grass = value,
            PollenCategory::Weed => self.weed = value,
        }
    }

    #[must_use]
    pub fn is_in_range(&self) -> bool {
        PollenCategory::ALL
            .iter()
            .all(|c| (MIN_SENSITIVITY..=MAX_SENSITIVITY).contains(&self.get(*c)))
    }

    /// Stable serialization used as part of forecast request keys
    #[must_use]
    pub fn request_key(&self) -> String {
        format!("tree:{},grass:{},weed:{}", self.tree, self.grass, self.weed)
    }
}

/// Round then clamp an edited sensitivity value. Non-finite input falls back to the default.
#[must_use]
pub fn normalize_sensitivity(value: f64) -> u8 {
    if !value.is_finite() {
        return DEFAULT_SENSITIVITY;
    }
    let clamped = value
        .round()
        .clamp(f64::from(MIN_SENSITIVITY), f64::from(MAX_SENSITIVITY));
    // In range 1..=10 after the clamp
    clamped as u8
}

/// Parse string-typed slider or text input before it enters the profile
pub fn parse_sensitivity_input(input: &str) -> Result<f64, SensitivityError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SensitivityError::validation("Sensitivity cannot be empty"));
    }
    let value = trimmed
        .parse::<f64>()
        .map_err(|_| SensitivityError::validation(format!("Not a number: {trimmed}")))?;
    if !value.is_finite() {
        return Err(SensitivityError::validation(format!(
            "Not a finite number: {trimmed}"
        )));
    }
    Ok(value)
}

/// A partial edit: only the `Some` fields are touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivityUpdate {
    pub tree: Option<f64>,
    pub grass: Option<f64>,
    pub weed: Option<f64>,
}

impl SensitivityUpdate {
    #[must_use]
    pub fn get(&self, category: PollenCategory) -> Option<f64> {
        match category {
            PollenCategory::Tree => self.tree,
            PollenCategory::Grass => self.grass,
            PollenCategory::Weed => self.weed,
        }
    }

    /// Merge into `profile`, normalizing each touched value
    #[must_use]
    pub fn apply_to(&self, mut profile: SensitivityProfile) -> SensitivityProfile {
        for category in PollenCategory::ALL {
            if let Some(value) = self.get(category) {
                profile.set(category, normalize_sensitivity(value));
            }
        }
        profile
    }
}

impl From<SensitivityProfile> for SensitivityUpdate {
    fn from(profile: SensitivityProfile) -> Self {
        Self {
            tree: Some(f64::from(profile.tree)),
            grass: Some(f64::from(profile.grass)),
            weed: Some(f64::from(profile.weed)),
        }
    }
}

/// Universal pollen index reading for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// 0-5 index value
    pub value: f64,
    /// Provider's category label, e.g. "Moderate"
    pub category: Option<String>,
}

/// One category's reading within a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMeasurement {
    pub category: PollenCategory,
    pub index_info: Option<IndexInfo>,
    pub in_season: bool,
    /// Free-text advisories from the provider
    pub health_recommendations: Vec<String>,
}

impl CategoryMeasurement {
    #[must_use]
    pub fn new(category: PollenCategory, value: f64, in_season: bool) -> Self {
        Self {
            category,
            index_info: Some(IndexInfo {
                value,
                category: None,
            }),
            in_season,
            health_recommendations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_recommendations<I, S>(mut self, recommendations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.health_recommendations = recommendations.into_iter().map(Into::into).collect();
        self
    }

    /// Raw index value; a missing index reads as 0
    #[must_use]
    pub fn raw_index(&self) -> f64 {
        self.index_info.as_ref().map_or(0.0, |info| info.value)
    }
}

/// One day of provider data, immutable once received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDailyMeasurement {
    pub date: NaiveDate,
    pub categories: Vec<CategoryMeasurement>,
}

impl RawDailyMeasurement {
    #[must_use]
    pub fn new(date: NaiveDate, categories: Vec<CategoryMeasurement>) -> Self {
        Self { date, categories }
    }

    #[must_use]
    pub fn category(&self, category: PollenCategory) -> Option<&CategoryMeasurement> {
        self.categories.iter().find(|c| c.category == category)
    }
}
