//! Risk Engine
//!
//! Turns one raw daily measurement and a sensitivity profile into a
//! [`RiskResult`]. Everything here is pure and never fails: out-of-range
//! inputs are clamped, missing categories read as index 0.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{
    CategoryRisk, PollenCategory, RawDailyMeasurement, RiskLevel, RiskResult, SensitivityProfile,
    pollen::{MAX_SENSITIVITY, MIN_SENSITIVITY},
};

pub const MIN_RAW_INDEX: f64 = 0.0;
pub const MAX_RAW_INDEX: f64 = 5.0;

/// Maximum number of advisories surfaced on a result
pub const MAX_ADVISORIES: usize = 5;

/// Label used when the caller has no location name
pub const DEFAULT_LOCATION_LABEL: &str = "Current Location";

/// Relative weight of each category in the aggregate score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    #[serde(default = "default_weight")]
    pub tree: f64,
    #[serde(default = "default_weight")]
    pub grass: f64,
    #[serde(default = "default_weight")]
    pub weed: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            tree: default_weight(),
            grass: default_weight(),
            weed: default_weight(),
        }
    }
}

impl CategoryWeights {
    #[must_use]
    pub fn get(&self, category: PollenCategory) -> f64 {
        match category {
            PollenCategory::Tree => self.tree,
            PollenCategory::Grass => self.grass,
            PollenCategory::Weed => self.weed,
        }
    }
}

/// Round half away from zero to one decimal place
#[must_use]
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// `round(raw_index * sensitivity / 10, 1)` after clamping both inputs
#[must_use]
pub fn calculate_category_score(raw_index: f64, sensitivity: f64) -> f64 {
    let raw_index = clamp_or(raw_index, MIN_RAW_INDEX, MAX_RAW_INDEX, MIN_RAW_INDEX);
    let sensitivity = clamp_or(
        sensitivity,
        f64::from(MIN_SENSITIVITY),
        f64::from(MAX_SENSITIVITY),
        f64::from(MIN_SENSITIVITY),
    );
    round_to_tenth(raw_index * sensitivity / 10.0)
}

/// Lower bound of each band is inclusive: 5.0 is `High`, not `Moderate`.
#[must_use]
pub fn classify_risk_level(score: f64) -> RiskLevel {
    if score.is_nan() || score < 2.0 {
        RiskLevel::Low
    } else if score < 5.0 {
        RiskLevel::Moderate
    } else if score < 8.0 {
        RiskLevel::High
    } else {
        RiskLevel::VeryHigh
    }
}

/// Score a day with equal category weights
#[must_use]
pub fn calculate_personalized_risk(
    measurement: &RawDailyMeasurement,
    profile: &SensitivityProfile,
    location_label: Option<&str>,
) -> RiskResult {
    RiskEngine::default().assess(measurement, profile, location_label)
}

/// Scoring parameters; the free functions above use the defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskEngine {
    pub weights: CategoryWeights,
    pub max_advisories: usize,
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            max_advisories: MAX_ADVISORIES,
        }
    }
}

impl RiskEngine {
    #[must_use]
    pub fn new(weights: CategoryWeights, max_advisories: usize) -> Self {
        Self {
            weights,
            max_advisories,
        }
    }

    #[must_use]
    pub fn assess(
        &self,
        measurement: &RawDailyMeasurement,
        profile: &SensitivityProfile,
        location_label: Option<&str>,
    ) -> RiskResult {
        let categories: Vec<CategoryRisk> = PollenCategory::ALL
            .iter()
            .map(|&category| {
                let reading = measurement.category(category);
                let raw_index = clamp_or(
                    reading.map_or(0.0, |r| r.raw_index()),
                    MIN_RAW_INDEX,
                    MAX_RAW_INDEX,
                    MIN_RAW_INDEX,
                );
                let score = calculate_category_score(raw_index, f64::from(profile.get(category)));
                CategoryRisk {
                    category,
                    raw_index,
                    score,
                    level: classify_risk_level(score),
                    in_season: reading.is_some_and(|r| r.in_season),
                }
            })
            .collect();

        let aggregate_score = self.aggregate(&categories);

        RiskResult {
            date: measurement.date,
            location_label: location_label
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(DEFAULT_LOCATION_LABEL)
                .to_string(),
            categories,
            aggregate_score,
            aggregate_level: classify_risk_level(aggregate_score),
            advisories: self.collect_advisories(measurement),
            computed_at: Utc::now(),
        }
    }

    /// Weighted mean of category scores, one decimal. Out-of-season categories still count.
    fn aggregate(&self, categories: &[CategoryRisk]) -> f64 {
        let (weighted_sum, total_weight) =
            categories
                .iter()
                .fold((0.0, 0.0), |(sum, total), category_risk| {
                    let weight = self.weights.get(category_risk.category).max(0.0);
                    (sum + category_risk.score * weight, total + weight)
                });

        if total_weight <= 0.0 {
            return 0.0;
        }
        round_to_tenth(weighted_sum / total_weight)
    }

    /// Advisories from in-season categories only, first appearance wins
    fn collect_advisories(&self, measurement: &RawDailyMeasurement) -> Vec<String> {
        let mut advisories: Vec<String> = Vec::new();
        for reading in measurement.categories.iter().filter(|c| c.in_season) {
            for advisory in &reading.health_recommendations {
                if advisories.len() >= self.max_advisories {
                    return advisories;
                }
                if !advisories.contains(advisory) {
                    advisories.push(advisory.clone());
                }
            }
        }
        advisories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryMeasurement;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 15).unwrap()
    }

    fn measurement(tree: f64, grass: f64, weed: f64) -> RawDailyMeasurement {
        RawDailyMeasurement::new(
            date(),
            vec![
                CategoryMeasurement::new(PollenCategory::Tree, tree, true),
                CategoryMeasurement::new(PollenCategory::Grass, grass, true),
                CategoryMeasurement::new(PollenCategory::Weed, weed, true),
            ],
        )
    }

    #[rstest]
    #[case(3.0, 5.0, 1.5)]
    #[case(4.0, 7.0, 2.8)]
    #[case(5.0, 10.0, 5.0)]
    #[case(0.0, 10.0, 0.0)]
    #[case(2.5, 3.0, 0.8)]
    #[case(1.0, 1.0, 0.1)]
    fn test_category_score_formula(
        #[case] raw_index: f64,
        #[case] sensitivity: f64,
        #[case] expected: f64,
    ) {
        assert_eq!(calculate_category_score(raw_index, sensitivity), expected);
    }

    #[test]
    fn test_category_score_matches_formula_over_full_domain() {
        for raw in 0..=5 {
            for sensitivity in 1..=10 {
                let raw = f64::from(raw);
                let sensitivity = f64::from(sensitivity);
                let expected = round_to_tenth(raw * sensitivity / 10.0);
                assert_eq!(calculate_category_score(raw, sensitivity), expected);
            }
        }
    }

    #[test]
    fn test_category_score_clamps_inputs() {
        assert_eq!(calculate_category_score(-1.0, 5.0), calculate_category_score(0.0, 5.0));
        assert_eq!(calculate_category_score(10.0, 5.0), calculate_category_score(5.0, 5.0));
        assert_eq!(calculate_category_score(3.0, 0.0), calculate_category_score(3.0, 1.0));
        assert_eq!(calculate_category_score(3.0, 42.0), calculate_category_score(3.0, 10.0));
        assert_eq!(calculate_category_score(f64::NAN, 5.0), 0.0);
    }

    #[rstest]
    #[case(0.0, RiskLevel::Low)]
    #[case(1.99, RiskLevel::Low)]
    #[case(2.0, RiskLevel::Moderate)]
    #[case(4.99, RiskLevel::Moderate)]
    #[case(5.0, RiskLevel::High)]
    #[case(7.99, RiskLevel::High)]
    #[case(8.0, RiskLevel::VeryHigh)]
    #[case(10.0, RiskLevel::VeryHigh)]
    fn test_classification_boundaries(#[case] score: f64, #[case] expected: RiskLevel) {
        assert_eq!(classify_risk_level(score), expected);
    }

    #[test]
    fn test_aggregate_example() {
        let profile = SensitivityProfile { tree: 6, grass: 4, weed: 8 };
        let result = calculate_personalized_risk(&measurement(3.0, 2.0, 1.0), &profile, None);

        let scores: Vec<f64> = result.categories.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![1.8, 0.8, 0.8]);
        // (1.8 + 0.8 + 0.8) / 3 = 1.133..., rounded to one decimal
        assert_eq!(result.aggregate_score, 1.1);
        assert_eq!(result.aggregate_level, RiskLevel::Low);
    }

    #[test]
    fn test_no_pollen_is_low_regardless_of_sensitivity() {
        let result = calculate_personalized_risk(
            &measurement(0.0, 0.0, 0.0),
            &SensitivityProfile::uniform(10),
            None,
        );
        assert_eq!(result.aggregate_score, 0.0);
        assert_eq!(result.aggregate_level, RiskLevel::Low);
    }

    #[test]
    fn test_maximum_exposure_hits_high_boundary() {
        let result = calculate_personalized_risk(
            &measurement(5.0, 5.0, 5.0),
            &SensitivityProfile::uniform(10),
            Some("San Francisco"),
        );
        assert!(result.categories.iter().all(|c| c.score == 5.0));
        assert_eq!(result.aggregate_score, 5.0);
        assert_eq!(result.aggregate_level, RiskLevel::High);
        assert_eq!(result.location_label, "San Francisco");
    }

    #[test]
    fn test_empty_measurement() {
        let empty = RawDailyMeasurement::new(date(), Vec::new());
        let result = calculate_personalized_risk(&empty, &SensitivityProfile::default(), None);

        assert_eq!(result.categories.len(), 3);
        assert!(result.categories.iter().all(|c| c.score == 0.0 && !c.in_season));
        assert_eq!(result.aggregate_score, 0.0);
        assert_eq!(result.aggregate_level, RiskLevel::Low);
        assert!(result.advisories.is_empty());
        assert_eq!(result.location_label, DEFAULT_LOCATION_LABEL);
    }

    #[test]
    fn test_missing_index_info_scores_zero() {
        let mut day = measurement(4.0, 4.0, 4.0);
        day.categories[1].index_info = None;
        let result = calculate_personalized_risk(&day, &SensitivityProfile::uniform(10), None);

        assert_eq!(result.category(PollenCategory::Grass).unwrap().score, 0.0);
        assert_eq!(result.category(PollenCategory::Tree).unwrap().score, 4.0);
    }

    #[test]
    fn test_advisories_only_from_in_season_categories() {
        let day = RawDailyMeasurement::new(
            date(),
            vec![
                CategoryMeasurement::new(PollenCategory::Tree, 4.0, true)
                    .with_recommendations(["Keep windows closed", "Shower after outdoor activity"]),
                CategoryMeasurement::new(PollenCategory::Grass, 5.0, false)
                    .with_recommendations(["Avoid mowing the lawn"]),
                CategoryMeasurement::new(PollenCategory::Weed, 2.0, true)
                    .with_recommendations(["Keep windows closed", "Wear sunglasses"]),
            ],
        );
        let result = calculate_personalized_risk(&day, &SensitivityProfile::default(), None);

        assert_eq!(
            result.advisories,
            vec![
                "Keep windows closed",
                "Shower after outdoor activity",
                "Wear sunglasses"
            ]
        );
        // out-of-season grass still contributes to the aggregate
        assert_eq!(result.category(PollenCategory::Grass).unwrap().score, 2.5);
        assert_eq!(result.aggregate_score, round_to_tenth((2.0 + 2.5 + 1.0) / 3.0));
    }

    #[test]
    fn test_advisories_capped() {
        let advisories: Vec<String> = (0..8).map(|i| format!("advice {i}")).collect();
        let day = RawDailyMeasurement::new(
            date(),
            vec![
                CategoryMeasurement::new(PollenCategory::Tree, 1.0, true)
                    .with_recommendations(advisories),
            ],
        );
        let result = calculate_personalized_risk(&day, &SensitivityProfile::default(), None);
        assert_eq!(result.advisories.len(), MAX_ADVISORIES);
        assert_eq!(result.advisories[0], "advice 0");
    }

    #[test]
    fn test_custom_weights() {
        let engine = RiskEngine::new(
            CategoryWeights {
                tree: 2.0,
                grass: 1.0,
                weed: 0.0,
            },
            MAX_ADVISORIES,
        );
        let result = engine.assess(
            &measurement(5.0, 2.0, 5.0),
            &SensitivityProfile::uniform(10),
            None,
        );
        // (5.0 * 2 + 2.0 * 1) / 3
        assert_eq!(result.aggregate_score, 4.0);
        assert_eq!(result.aggregate_level, RiskLevel::Moderate);
    }

    #[test]
    fn test_computed_after_measurement_date() {
        let result = calculate_personalized_risk(
            &measurement(1.0, 1.0, 1.0),
            &SensitivityProfile::default(),
            None,
        );
        assert!(result.computed_at.date_naive() > result.date);
    }
}
