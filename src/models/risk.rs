//! Personalized risk results

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::PollenCategory;

/// Discrete risk band for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    /// score < 2
    Low,
    /// 2 <= score < 5
    Moderate,
    /// 5 <= score < 8
    High,
    /// score >= 8
    VeryHigh,
}

impl RiskLevel {
    /// Stable identifier, e.g. `very-high`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very-high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Moderate => write!(f, "Moderate"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::VeryHigh => write!(f, "Very High"),
        }
    }
}

/// Risk for a single pollen category on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRisk {
    pub category: PollenCategory,
    /// Provider index after clamping to 0-5
    pub raw_index: f64,
    /// Personalized score, one decimal
    pub score: f64,
    pub level: RiskLevel,
    pub in_season: bool,
}

/// Personalized assessment of one forecast day. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    pub date: NaiveDate,
    pub location_label: String,
    /// One entry per category, in `PollenCategory::ALL` order
    pub categories: Vec<CategoryRisk>,
    pub aggregate_score: f64,
    pub aggregate_level: RiskLevel,
    /// Deduplicated in-season advisories, capped for display
    pub advisories: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl RiskResult {
    #[must_use]
    pub fn category(&self, category: PollenCategory) -> Option<&CategoryRisk> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Highest scoring category, if any scored above zero
    #[must_use]
    pub fn dominant_category(&self) -> Option<&CategoryRisk> {
        self.categories
            .iter()
            .filter(|c| c.score > 0.0)
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}
