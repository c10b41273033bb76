//! Day-over-day trends and activity suggestions derived from risk results

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{RiskLevel, RiskResult};
use crate::risk::round_to_tenth;

/// Differences smaller than this are reported as stable
pub const STABLE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Worsening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendMagnitude {
    /// |difference| < 1.0
    Slight,
    /// |difference| < 2.0
    Moderate,
    Significant,
}

/// Comparison of one day's aggregate score against the previous day's
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub magnitude: TrendMagnitude,
    /// current - previous, one decimal
    pub score_difference: f64,
}

impl Trend {
    #[must_use]
    pub fn between(current: &RiskResult, previous: &RiskResult) -> Self {
        // Scores carry one decimal; classify the rounded difference so 2.3 - 1.8 is 0.5
        let difference = round_to_tenth(current.aggregate_score - previous.aggregate_score);
        let abs = difference.abs();

        let direction = if abs < STABLE_THRESHOLD {
            TrendDirection::Stable
        } else if difference > 0.0 {
            TrendDirection::Worsening
        } else {
            TrendDirection::Improving
        };

        let magnitude = if abs < 1.0 {
            TrendMagnitude::Slight
        } else if abs < 2.0 {
            TrendMagnitude::Moderate
        } else {
            TrendMagnitude::Significant
        };

        Self {
            direction,
            magnitude,
            score_difference: difference,
        }
    }

    #[must_use]
    pub fn description(&self) -> String {
        match self.direction {
            TrendDirection::Stable => "About the same as the day before".to_string(),
            TrendDirection::Worsening => format!("{} increase from the day before", self.magnitude),
            TrendDirection::Improving => format!("{} decrease from the day before", self.magnitude),
        }
    }
}

impl fmt::Display for TrendMagnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendMagnitude::Slight => write!(f, "Slight"),
            TrendMagnitude::Moderate => write!(f, "Moderate"),
            TrendMagnitude::Significant => write!(f, "Significant"),
        }
    }
}

/// Trend for `forecast[day_index]` against the day before it.
/// `None` for the first day or an index past the end.
#[must_use]
pub fn trend_at(forecast: &[RiskResult], day_index: usize) -> Option<Trend> {
    if day_index == 0 {
        return None;
    }
    let current = forecast.get(day_index)?;
    let previous = forecast.get(day_index - 1)?;
    Some(Trend::between(current, previous))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Ideal,
    Caution,
    Avoid,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityLevel::Ideal => write!(f, "Ideal"),
            ActivityLevel::Caution => write!(f, "Caution"),
            ActivityLevel::Avoid => write!(f, "Avoid"),
        }
    }
}

/// Outdoor activity suggestion for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecommendation {
    pub activity: ActivityLevel,
    pub reason: String,
    /// Absent when outdoor activity should be avoided
    pub best_time: Option<String>,
}

impl ActivityRecommendation {
    #[must_use]
    pub fn for_level(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => Self {
                activity: ActivityLevel::Ideal,
                reason: "Pollen levels are low for you. A good day to be outside.".to_string(),
                best_time: Some("Any time".to_string()),
            },
            RiskLevel::Moderate => Self {
                activity: ActivityLevel::Caution,
                reason: "Moderate pollen for your sensitivity. Keep outdoor time short and have medication at hand.".to_string(),
                best_time: Some("Late afternoon or evening".to_string()),
            },
            RiskLevel::High => Self {
                activity: ActivityLevel::Avoid,
                reason: "High pollen for your sensitivity. Prefer indoor activities.".to_string(),
                best_time: None,
            },
            RiskLevel::VeryHigh => Self {
                activity: ActivityLevel::Avoid,
                reason: "Very high pollen for your sensitivity. Stay indoors with windows closed if you can.".to_string(),
                best_time: None,
            },
        }
    }
}

/// Recommendation for `forecast[day_index]`, `None` past the end
#[must_use]
pub fn recommendation_at(forecast: &[RiskResult], day_index: usize) -> Option<ActivityRecommendation> {
    forecast
        .get(day_index)
        .map(|day| ActivityRecommendation::for_level(day.aggregate_level))
}
