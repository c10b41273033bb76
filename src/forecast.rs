//! Forecast Orchestrator
//!
//! Fetches raw daily measurements for a location, scores every day with the
//! risk engine and caches the resulting list. Requests are identified by
//! rounded coordinates, day count and sensitivity profile: an identical
//! request is not issued twice, a different one cancels the one in flight.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ForecastConfig;
use crate::error::{FetchError, ForecastError};
use crate::geo::distance_meters;
use crate::lock;
use crate::models::{Location, RiskResult, SensitivityProfile};
use crate::providers::ForecastProvider;
use crate::risk::RiskEngine;
use crate::trend::{ActivityRecommendation, Trend, recommendation_at, trend_at};

/// Decimal places of the coordinates in a request key (about 0.1 m)
const KEY_PRECISION: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// New results were stored
    Updated { days: usize },
    /// Same request already in flight or its data is still fresh
    Skipped,
    /// Cancelled or superseded before completing
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSnapshot {
    pub forecast: Vec<RiskResult>,
    /// First load, nothing to show yet
    pub is_loading: bool,
    /// Replacing data that is already shown
    pub is_refreshing: bool,
    pub error: Option<ForecastError>,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_fetch_location: Option<Location>,
}

#[derive(Debug, Clone)]
struct ForecastRequest {
    location: Location,
    profile: SensitivityProfile,
    days: u32,
}

#[derive(Default)]
struct ForecastState {
    forecast: Vec<RiskResult>,
    is_loading: bool,
    is_refreshing: bool,
    error: Option<ForecastError>,
    last_key: Option<String>,
    last_request: Option<ForecastRequest>,
    last_fetch_at: Option<DateTime<Utc>>,
    last_fetch_location: Option<Location>,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl ForecastState {
    fn clear_flags(&mut self) {
        self.is_loading = false;
        self.is_refreshing = false;
        self.in_flight = None;
    }

    fn is_older_than(&self, max_age_minutes: u32) -> bool {
        match self.last_fetch_at {
            Some(fetched_at) if !self.forecast.is_empty() => {
                Utc::now() - fetched_at > chrono::Duration::minutes(i64::from(max_age_minutes))
            }
            _ => true,
        }
    }
}

/// Identity of a fetch: rounded coordinates, day count, serialized profile
#[must_use]
pub fn request_key(location: &Location, profile: &SensitivityProfile, days: u32) -> String {
    let (lat, lon) = location.rounded_coordinates(KEY_PRECISION);
    format!("{lat:.6},{lon:.6}|{days}|{}", profile.request_key())
}

/// Label for results; unnamed locations fall back to the engine's placeholder
fn result_label(location: &Location) -> Option<String> {
    if location.name.is_some() || location.city.is_some() {
        Some(location.display_label())
    } else {
        None
    }
}

pub struct ForecastOrchestrator {
    config: ForecastConfig,
    provider: Arc<dyn ForecastProvider>,
    engine: RiskEngine,
    state: Mutex<ForecastState>,
}

impl ForecastOrchestrator {
    #[must_use]
    pub fn new(config: ForecastConfig, provider: Arc<dyn ForecastProvider>) -> Self {
        let engine = RiskEngine::new(config.weights, config.max_advisories);
        Self {
            config,
            provider,
            engine,
            state: Mutex::new(ForecastState::default()),
        }
    }

    /// Fetch the configured number of days
    pub async fn fetch_data(
        &self,
        location: &Location,
        profile: &SensitivityProfile,
    ) -> Result<FetchOutcome, ForecastError> {
        self.fetch_days(location, profile, self.config.days).await
    }

    #[instrument(skip(self, location, profile), fields(lat = location.latitude, lon = location.longitude))]
    pub async fn fetch_days(
        &self,
        location: &Location,
        profile: &SensitivityProfile,
        days: u32,
    ) -> Result<FetchOutcome, ForecastError> {
        let days = days.max(1);
        let key = request_key(location, profile, days);

        let (generation, cancel) = {
            let mut state = lock(&self.state);
            if state.last_key.as_deref() == Some(key.as_str())
                && (state.in_flight.is_some() || !state.is_older_than(self.config.max_age_minutes))
            {
                debug!("Skipping duplicate forecast request {}", key);
                return Ok(FetchOutcome::Skipped);
            }
            if let Some(previous) = state.in_flight.take() {
                debug!("Cancelling forecast request superseded by {}", key);
                previous.cancel();
            }

            state.generation += 1;
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());
            state.last_key = Some(key);
            state.last_request = Some(ForecastRequest {
                location: location.clone(),
                profile: *profile,
                days,
            });
            state.error = None;
            if state.forecast.is_empty() {
                state.is_loading = true;
                state.is_refreshing = false;
            } else {
                state.is_loading = false;
                state.is_refreshing = true;
            }
            (state.generation, token)
        };

        let result = self.provider.fetch(location, days, cancel.clone()).await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            return Ok(FetchOutcome::Cancelled);
        }
        state.clear_flags();

        if cancel.is_cancelled() || matches!(result, Err(FetchError::Aborted)) {
            state.last_key = None;
            debug!("Forecast request cancelled");
            return Ok(FetchOutcome::Cancelled);
        }

        let measurements = match result {
            Ok(measurements) if measurements.is_empty() => Err(ForecastError::no_data(format!(
                "Provider returned no forecast days for {}",
                location.format_coordinates()
            ))),
            Ok(measurements) => Ok(measurements),
            Err(e) => Err(ForecastError::from(e)),
        };

        match measurements {
            Ok(measurements) => {
                let label = result_label(location);
                state.forecast = measurements
                    .iter()
                    .map(|day| self.engine.assess(day, profile, label.as_deref()))
                    .collect();
                state.last_fetch_at = Some(Utc::now());
                state.last_fetch_location = Some(location.clone());
                info!(
                    "Scored {} forecast days for {}",
                    state.forecast.len(),
                    location.format_coordinates()
                );
                Ok(FetchOutcome::Updated {
                    days: state.forecast.len(),
                })
            }
            Err(err) => {
                warn!("Forecast fetch failed: {}", err);
                state.last_key = None;
                state.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Re-issue the last request even if its data is fresh
    pub async fn refresh(&self) -> Result<FetchOutcome, ForecastError> {
        let request = {
            let mut state = lock(&self.state);
            let Some(request) = state.last_request.clone() else {
                return Ok(FetchOutcome::Skipped);
            };
            if state.in_flight.is_none() {
                state.last_key = None;
            }
            request
        };
        self.fetch_days(&request.location, &request.profile, request.days)
            .await
    }

    /// Abort the fetch in flight. The aborted call resolves without an error.
    pub fn cancel(&self) -> bool {
        let mut state = lock(&self.state);
        match state.in_flight.take() {
            Some(token) => {
                token.cancel();
                state.clear_flags();
                state.last_key = None;
                true
            }
            None => false,
        }
    }

    /// True without a prior fetch or once `candidate` is beyond the refresh distance
    #[must_use]
    pub fn needs_refresh(&self, candidate: &Location) -> bool {
        match &lock(&self.state).last_fetch_location {
            Some(last) => {
                distance_meters(last.coordinates(), candidate.coordinates())
                    > self.config.refresh_distance_m
            }
            None => true,
        }
    }

    /// Stale against the configured maximum age
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.is_older_than(self.config.max_age_minutes)
    }

    #[must_use]
    pub fn is_older_than(&self, max_age_minutes: u32) -> bool {
        lock(&self.state).is_older_than(max_age_minutes)
    }

    /// Trend of a day against the day before; `None` for the first day
    #[must_use]
    pub fn trend(&self, day_index: usize) -> Option<Trend> {
        trend_at(&lock(&self.state).forecast, day_index)
    }

    #[must_use]
    pub fn activity_recommendation(&self, day_index: usize) -> Option<ActivityRecommendation> {
        recommendation_at(&lock(&self.state).forecast, day_index)
    }

    /// Today's result
    #[must_use]
    pub fn current_risk(&self) -> Option<RiskResult> {
        lock(&self.state).forecast.first().cloned()
    }

    #[must_use]
    pub fn forecast(&self) -> Vec<RiskResult> {
        lock(&self.state).forecast.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> ForecastSnapshot {
        let state = lock(&self.state);
        ForecastSnapshot {
            forecast: state.forecast.clone(),
            is_loading: state.is_loading,
            is_refreshing: state.is_refreshing,
            error: state.error.clone(),
            last_fetch_at: state.last_fetch_at,
            last_fetch_location: state.last_fetch_location.clone(),
        }
    }

    pub fn clear_error(&self) {
        lock(&self.state).error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key_ignores_sub_decimeter_jitter() {
        let profile = SensitivityProfile::default();
        let a = Location::manual(37.774_900_01, -122.419_4).unwrap();
        let b = Location::manual(37.774_900_04, -122.419_4).unwrap();
        let c = Location::manual(37.775, -122.419_4).unwrap();

        assert_eq!(request_key(&a, &profile, 3), request_key(&b, &profile, 3));
        assert_ne!(request_key(&a, &profile, 3), request_key(&c, &profile, 3));
        assert_ne!(request_key(&a, &profile, 3), request_key(&a, &profile, 5));
        assert_ne!(
            request_key(&a, &profile, 3),
            request_key(&a, &SensitivityProfile::uniform(6), 3)
        );
    }

    #[test]
    fn test_result_label_prefers_place_names() {
        let location = Location::manual(1.0, 2.0).unwrap();
        assert_eq!(result_label(&location), None);
        assert_eq!(result_label(&location.with_name("Home")).as_deref(), Some("Home"));
    }
}
