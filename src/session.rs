//! Wires the state managers together
//!
//! Location and sensitivity changes arrive as broadcast events; the session
//! decides whether they warrant a new forecast fetch. The managers never hold
//! references to each other.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ForecastError;
use crate::forecast::{FetchOutcome, ForecastOrchestrator};
use crate::location_manager::{LocationEvent, LocationManager};
use crate::sensitivity_manager::{SensitivityEvent, SensitivityManager};

pub struct PollenSession {
    location: Arc<LocationManager>,
    sensitivity: SensitivityManager,
    forecast: Arc<ForecastOrchestrator>,
}

impl PollenSession {
    #[must_use]
    pub fn new(
        location: Arc<LocationManager>,
        sensitivity: SensitivityManager,
        forecast: Arc<ForecastOrchestrator>,
    ) -> Self {
        Self {
            location,
            sensitivity,
            forecast,
        }
    }

    #[must_use]
    pub fn location(&self) -> &Arc<LocationManager> {
        &self.location
    }

    #[must_use]
    pub fn sensitivity(&self) -> &SensitivityManager {
        &self.sensitivity
    }

    #[must_use]
    pub fn forecast(&self) -> &Arc<ForecastOrchestrator> {
        &self.forecast
    }

    /// Restore persisted state, detect if enabled, then load the forecast
    pub async fn start(&self) -> Result<Option<FetchOutcome>, ForecastError> {
        self.sensitivity.load().await;
        let settings = self.location.load().await;

        if settings.auto_detect {
            match self.location.detect().await {
                Ok(outcome) => debug!("Startup detection: {:?}", outcome),
                Err(e) => warn!("Startup detection failed: {}", e),
            }
        }

        self.refresh_forecast().await
    }

    /// Fetch for the current location and profile. `None` without a location.
    pub async fn refresh_forecast(&self) -> Result<Option<FetchOutcome>, ForecastError> {
        let Some(location) = self.location.current_location() else {
            debug!("No location yet, forecast not requested");
            return Ok(None);
        };
        let profile = self.sensitivity.profile();
        self.forecast.fetch_data(&location, &profile).await.map(Some)
    }

    /// React to a location event. Returns `None` when no fetch was needed.
    pub async fn handle_location_event(
        &self,
        event: &LocationEvent,
    ) -> Option<Result<FetchOutcome, ForecastError>> {
        let LocationEvent::Changed(location) = event else {
            return None;
        };
        if !self.forecast.needs_refresh(location) && !self.forecast.is_stale() {
            debug!("Location change within forecast resolution, keeping current data");
            return None;
        }
        let profile = self.sensitivity.profile();
        Some(self.forecast.fetch_data(location, &profile).await)
    }

    /// React to a sensitivity event. Invalid profiles never trigger a fetch.
    pub async fn handle_sensitivity_event(
        &self,
        event: &SensitivityEvent,
    ) -> Option<Result<FetchOutcome, ForecastError>> {
        let SensitivityEvent::Changed {
            profile,
            is_valid: true,
        } = event
        else {
            return None;
        };
        let location = self.location.current_location()?;
        Some(self.forecast.fetch_data(&location, profile).await)
    }

    /// Listen to both managers until `shutdown` fires. Each fetch runs on its own
    /// task so a newer request can cancel an older one.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut location_events = self.location.subscribe();
        let mut sensitivity_events = self.sensitivity.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    event = location_events.recv() => match event {
                        Ok(event) => {
                            let session = Arc::clone(&self);
                            tokio::spawn(async move {
                                session.handle_location_event(&event).await;
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => warn!("Missed {} location events", skipped),
                        Err(RecvError::Closed) => break,
                    },
                    event = sensitivity_events.recv() => match event {
                        Ok(event) => {
                            let session = Arc::clone(&self);
                            tokio::spawn(async move {
                                session.handle_sensitivity_event(&event).await;
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => warn!("Missed {} sensitivity events", skipped),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            self.forecast.cancel();
            debug!("Session stopped");
        })
    }
}
