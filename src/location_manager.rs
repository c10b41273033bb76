//! Location State Manager
//!
//! Owns where the user is. Detected positions only replace the current
//! location when they moved far enough to matter; manual choices always take
//! effect. Every settings mutation is persisted and announced on a broadcast
//! channel.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::LocationConfig;
use crate::error::{GeolocationError, LocationError};
use crate::geo::distance_meters;
use crate::lock;
use crate::models::{Coordinates, Location, LocationSettings, LocationSource, PlaceResult};
use crate::providers::{DetectOptions, GeolocationDetector, KeyValueStore, PermissionState};
use crate::storage::{LOCATION_SETTINGS_KEY, load_json, save_json};

const EVENT_CAPACITY: usize = 32;

/// Per-attempt detection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionPhase {
    #[default]
    Idle,
    Detecting,
    Resolved,
    Failed,
}

/// Result of a detection attempt that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum DetectOutcome {
    /// The position became the current location
    Accepted(Location),
    /// The position was within the jitter threshold and was discarded
    Suppressed { distance_m: f64 },
    /// Cancelled or superseded by a newer request
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// The current location was replaced
    Changed(Location),
    /// Saved locations or the auto-detect toggle changed
    SettingsUpdated,
    PermissionChanged(PermissionState),
    Failed(LocationError),
}

/// Point-in-time copy of the manager state
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSnapshot {
    pub settings: LocationSettings,
    pub phase: DetectionPhase,
    pub error: Option<LocationError>,
    pub permission: PermissionState,
}

impl LocationSnapshot {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == DetectionPhase::Detecting
    }

    #[must_use]
    pub fn current(&self) -> Option<&Location> {
        self.settings.current.as_ref()
    }
}

#[derive(Default)]
struct LocationState {
    settings: LocationSettings,
    phase: DetectionPhase,
    error: Option<LocationError>,
    permission: PermissionState,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl LocationState {
    /// Cancel any running detection and invalidate its late result
    fn supersede_detection(&mut self) {
        if let Some(previous) = self.in_flight.take() {
            debug!("Superseding in-flight detection");
            previous.cancel();
        }
        self.generation += 1;
    }
}

pub struct LocationManager {
    config: LocationConfig,
    detector: Arc<dyn GeolocationDetector>,
    store: Arc<dyn KeyValueStore>,
    state: Mutex<LocationState>,
    events: broadcast::Sender<LocationEvent>,
}

impl LocationManager {
    #[must_use]
    pub fn new(
        config: LocationConfig,
        detector: Arc<dyn GeolocationDetector>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            detector,
            store,
            state: Mutex::new(LocationState::default()),
            events,
        }
    }

    /// Restore persisted settings. Unreadable data and out-of-range entries are dropped.
    pub async fn load(&self) -> LocationSettings {
        let mut settings = match load_json::<LocationSettings>(self.store.as_ref(), LOCATION_SETTINGS_KEY).await {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read location settings, using defaults: {}", e);
                LocationSettings::default()
            }
        };

        let dropped = settings.retain_valid();
        if dropped > 0 {
            warn!("Dropped {} persisted locations with invalid coordinates", dropped);
        }
        let cap = self.config.max_saved_locations;
        if settings.saved.len() > cap {
            let excess = settings.saved.len() - cap;
            settings.saved.drain(..excess);
        }

        lock(&self.state).settings = settings.clone();
        settings
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LocationEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> LocationSnapshot {
        let state = lock(&self.state);
        LocationSnapshot {
            settings: state.settings.clone(),
            phase: state.phase,
            error: state.error.clone(),
            permission: state.permission,
        }
    }

    #[must_use]
    pub fn current_location(&self) -> Option<Location> {
        lock(&self.state).settings.current.clone()
    }

    #[must_use]
    pub fn auto_detect_enabled(&self) -> bool {
        lock(&self.state).settings.auto_detect
    }

    pub fn clear_error(&self) {
        let mut state = lock(&self.state);
        state.error = None;
        if state.phase == DetectionPhase::Failed {
            state.phase = DetectionPhase::Idle;
        }
    }

    /// Detect the current position. A newer call cancels an older one still in flight.
    #[instrument(skip(self))]
    pub async fn detect(&self) -> Result<DetectOutcome, LocationError> {
        if !self.detector.is_supported() {
            let err = LocationError::NotSupported;
            {
                let mut state = lock(&self.state);
                state.phase = DetectionPhase::Failed;
                state.error = Some(err.clone());
            }
            self.notify(LocationEvent::Failed(err.clone()));
            return Err(err);
        }

        let (generation, cancel) = {
            let mut state = lock(&self.state);
            state.supersede_detection();
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());
            state.phase = DetectionPhase::Detecting;
            state.error = None;
            (state.generation, token)
        };

        let options = DetectOptions {
            timeout: self.config.detection_timeout(),
            high_accuracy: self.config.high_accuracy,
            maximum_age: self.config.maximum_position_age(),
        };
        let detection = tokio::time::timeout(options.timeout, self.detector.detect(options, cancel.clone()));
        let result = tokio::select! {
            () = cancel.cancelled() => Err(GeolocationError::Aborted),
            outcome = detection => outcome.unwrap_or(Err(GeolocationError::Timeout)),
        };

        if cancel.is_cancelled() || matches!(result, Err(GeolocationError::Aborted)) {
            self.finish_cancelled(generation);
            return Ok(DetectOutcome::Cancelled);
        }

        let candidate = result.map_err(LocationError::from).and_then(|position| {
            let candidate = Location::detected(position.coordinates, position.timestamp, position.accuracy_m);
            candidate.validate().map(|()| candidate)
        });

        let candidate = match candidate {
            Ok(candidate) => candidate,
            Err(err) => return self.fail_detection(generation, err),
        };

        let settings = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                return Ok(DetectOutcome::Cancelled);
            }
            state.in_flight = None;
            state.phase = DetectionPhase::Resolved;

            if let Some(current) = &state.settings.current {
                let moved = distance_meters(current.coordinates(), candidate.coordinates());
                if moved < self.config.significant_change_m {
                    debug!("Ignoring detected position {:.0} m from current location", moved);
                    return Ok(DetectOutcome::Suppressed { distance_m: moved });
                }
            }

            state.settings.current = Some(candidate.clone());
            state.settings.last_detected_at = candidate.timestamp.or_else(|| Some(Utc::now()));
            state.settings.clone()
        };

        info!("Accepted detected location {}", candidate.format_coordinates());
        self.persist(&settings).await;
        self.notify(LocationEvent::Changed(candidate.clone()));
        Ok(DetectOutcome::Accepted(candidate))
    }

    /// Abort the in-flight detection, if any. The aborted call reports `Cancelled`, not an error.
    pub fn cancel_detection(&self) -> bool {
        match lock(&self.state).in_flight.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn finish_cancelled(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.generation == generation {
            state.in_flight = None;
            state.phase = DetectionPhase::Idle;
        }
        debug!("Detection cancelled");
    }

    fn fail_detection(&self, generation: u64, err: LocationError) -> Result<DetectOutcome, LocationError> {
        {
            let mut state = lock(&self.state);
            if state.generation != generation {
                return Ok(DetectOutcome::Cancelled);
            }
            state.in_flight = None;
            state.phase = DetectionPhase::Failed;
            state.error = Some(err.clone());
        }
        warn!("Location detection failed: {}", err);
        self.notify(LocationEvent::Failed(err.clone()));
        Err(err)
    }

    /// Set the location from "lat,lon" text. Invalid input leaves state untouched.
    pub async fn set_manual(&self, input: &str, label: Option<&str>) -> Result<Location, LocationError> {
        let coordinates: Coordinates = input.parse()?;
        let mut location = Location::from_coordinates(coordinates, LocationSource::Manual);
        location.name = label.map(str::trim).filter(|l| !l.is_empty()).map(str::to_string);

        let settings = {
            let mut state = lock(&self.state);
            state.supersede_detection();
            state.settings.current = Some(location.clone());
            state.error = None;
            state.phase = DetectionPhase::Idle;
            state.settings.clone()
        };

        info!("Manual location set to {}", location.display_label());
        self.persist(&settings).await;
        self.notify(LocationEvent::Changed(location.clone()));
        Ok(location)
    }

    /// Use a place search result. Turns auto-detection off and remembers the place.
    pub async fn set_from_place_selection(&self, place: &PlaceResult) -> Result<Location, LocationError> {
        let location = place.to_location()?;

        let settings = {
            let mut state = lock(&self.state);
            state.supersede_detection();
            state.settings.current = Some(location.clone());
            state.settings.auto_detect = false;
            state.error = None;
            state.phase = DetectionPhase::Idle;
            upsert_saved(
                &mut state.settings.saved,
                location.clone(),
                self.config.saved_dedup_m,
                self.config.max_saved_locations,
            );
            state.settings.clone()
        };

        info!("Selected place {}", location.display_label());
        self.persist(&settings).await;
        self.notify(LocationEvent::Changed(location.clone()));
        Ok(location)
    }

    /// Flip auto-detection and return the new value
    pub async fn toggle_auto_detection(&self) -> bool {
        let settings = {
            let mut state = lock(&self.state);
            state.settings.auto_detect = !state.settings.auto_detect;
            state.settings.clone()
        };
        debug!("Auto-detection {}", if settings.auto_detect { "enabled" } else { "disabled" });
        self.persist(&settings).await;
        self.notify(LocationEvent::SettingsUpdated);
        settings.auto_detect
    }

    /// Remember a location. An entry within the dedup radius is updated in place.
    pub async fn save_location(&self, location: Location, name: Option<&str>) -> Result<Location, LocationError> {
        location.validate()?;
        let mut location = location;
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            location.name = Some(name.to_string());
        }

        let (settings, saved) = {
            let mut state = lock(&self.state);
            let saved = upsert_saved(
                &mut state.settings.saved,
                location,
                self.config.saved_dedup_m,
                self.config.max_saved_locations,
            );
            (state.settings.clone(), saved)
        };

        self.persist(&settings).await;
        self.notify(LocationEvent::SettingsUpdated);
        Ok(saved)
    }

    pub async fn remove_location(&self, index: usize) -> Result<Location, LocationError> {
        let (settings, removed) = {
            let mut state = lock(&self.state);
            if index >= state.settings.saved.len() {
                return Err(LocationError::invalid(format!(
                    "No saved location at index {index}"
                )));
            }
            let removed = state.settings.saved.remove(index);
            (state.settings.clone(), removed)
        };

        self.persist(&settings).await;
        self.notify(LocationEvent::SettingsUpdated);
        Ok(removed)
    }

    /// Make a saved location current. Like any manual choice this turns auto-detection off.
    pub async fn select_saved_location(&self, location: &Location) -> Result<(), LocationError> {
        location.validate()?;

        let settings = {
            let mut state = lock(&self.state);
            state.supersede_detection();
            state.settings.current = Some(location.clone());
            state.settings.auto_detect = false;
            state.error = None;
            state.phase = DetectionPhase::Idle;
            state.settings.clone()
        };

        self.persist(&settings).await;
        self.notify(LocationEvent::Changed(location.clone()));
        Ok(())
    }

    /// Re-query the platform permission. Failures leave the state `Unknown`.
    pub async fn refresh_permission(&self) -> PermissionState {
        let permission = if self.detector.is_supported() {
            match self.detector.permission_state().await {
                Ok(permission) => permission,
                Err(e) => {
                    debug!("Permission query failed: {}", e);
                    PermissionState::Unknown
                }
            }
        } else {
            PermissionState::Unknown
        };

        let changed = {
            let mut state = lock(&self.state);
            let changed = state.permission != permission;
            state.permission = permission;
            changed
        };
        if changed {
            self.notify(LocationEvent::PermissionChanged(permission));
        }
        permission
    }

    /// Poll the permission state until `shutdown` fires
    pub fn spawn_permission_watcher(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.permission_poll_interval());
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        manager.refresh_permission().await;
                    }
                }
            }
            debug!("Permission watcher stopped");
        })
    }

    async fn persist(&self, settings: &LocationSettings) {
        if let Err(e) = save_json(self.store.as_ref(), LOCATION_SETTINGS_KEY, settings).await {
            warn!("Failed to persist location settings: {}", e);
        }
    }

    fn notify(&self, event: LocationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Insert or update `location` in `saved`, evicting the oldest entries beyond `cap`
fn upsert_saved(saved: &mut Vec<Location>, location: Location, dedup_m: f64, cap: usize) -> Location {
    let coordinates = location.coordinates();
    if let Some(existing) = saved
        .iter_mut()
        .find(|s| distance_meters(s.coordinates(), coordinates) <= dedup_m)
    {
        let name = location.name.clone().or_else(|| existing.name.take());
        *existing = Location { name, ..location };
        return existing.clone();
    }

    saved.push(location.clone());
    if saved.len() > cap {
        let excess = saved.len() - cap;
        saved.drain(..excess);
    }
    location
}
