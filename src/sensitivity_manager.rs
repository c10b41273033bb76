//! Sensitivity State Manager
//!
//! Holds the editable profile next to the last persisted one. Every edit is
//! normalized and validated, invalid profiles stay visible but are never
//! written, and auto-save coalesces a burst of edits into one write of the
//! final value.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SensitivityConfig;
use crate::error::SensitivityError;
use crate::lock;
use crate::models::pollen::parse_sensitivity_input;
use crate::models::{PollenCategory, SensitivityProfile, SensitivityUpdate};
use crate::providers::{KeyValueStore, ProfileValidator};
use crate::storage::{SENSITIVITY_KEY, load_json, save_json};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(SensitivityProfile),
    /// No changes, or the profile is invalid. Not an error.
    NothingToSave,
    AlreadySaving,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensitivityEvent {
    Changed {
        profile: SensitivityProfile,
        is_valid: bool,
    },
    Saved(SensitivityProfile),
    SaveFailed(SensitivityError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensitivitySnapshot {
    pub profile: SensitivityProfile,
    /// Comparison baseline for `has_changes`
    pub persisted: SensitivityProfile,
    pub is_valid: bool,
    pub has_changes: bool,
    pub is_saving: bool,
    pub error: Option<SensitivityError>,
}

struct SensitivityState {
    profile: SensitivityProfile,
    persisted: SensitivityProfile,
    is_valid: bool,
    is_saving: bool,
    error: Option<SensitivityError>,
    save_generation: u64,
    pending_save: Option<(u64, CancellationToken)>,
}

impl SensitivityState {
    fn has_changes(&self) -> bool {
        self.profile != self.persisted
    }

    fn cancel_pending_save(&mut self) {
        if let Some((_, token)) = self.pending_save.take() {
            token.cancel();
        }
    }
}

struct Inner {
    config: SensitivityConfig,
    store: Arc<dyn KeyValueStore>,
    validator: Arc<dyn ProfileValidator>,
    state: Mutex<SensitivityState>,
    events: broadcast::Sender<SensitivityEvent>,
}

/// Cheap to clone; clones share state
#[derive(Clone)]
pub struct SensitivityManager {
    inner: Arc<Inner>,
}

impl SensitivityManager {
    #[must_use]
    pub fn new(
        config: SensitivityConfig,
        store: Arc<dyn KeyValueStore>,
        validator: Arc<dyn ProfileValidator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let profile = SensitivityProfile::default();
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                validator,
                state: Mutex::new(SensitivityState {
                    profile,
                    persisted: profile,
                    is_valid: true,
                    is_saving: false,
                    error: None,
                    save_generation: 0,
                    pending_save: None,
                }),
                events,
            }),
        }
    }

    /// Read the persisted profile. A first run persists the defaults.
    pub async fn load(&self) -> SensitivityProfile {
        let stored = load_json::<SensitivityProfile>(self.inner.store.as_ref(), SENSITIVITY_KEY).await;
        let profile = match stored {
            Ok(Some(profile)) if profile.is_in_range() => profile,
            Ok(Some(profile)) => {
                warn!("Discarding out-of-range sensitivity profile {}", profile.request_key());
                SensitivityProfile::default()
            }
            Ok(None) => {
                let defaults = SensitivityProfile::default();
                if let Err(e) = save_json(self.inner.store.as_ref(), SENSITIVITY_KEY, &defaults).await {
                    warn!("Failed to persist default sensitivity profile: {}", e);
                }
                defaults
            }
            Err(e) => {
                warn!("Failed to read sensitivity profile, using defaults: {}", e);
                SensitivityProfile::default()
            }
        };

        let is_valid = self.inner.validator.validate(&profile).is_ok();
        let mut state = lock(&self.inner.state);
        state.cancel_pending_save();
        state.profile = profile;
        state.persisted = profile;
        state.is_valid = is_valid;
        state.error = None;
        profile
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SensitivityEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SensitivitySnapshot {
        let state = lock(&self.inner.state);
        SensitivitySnapshot {
            profile: state.profile,
            persisted: state.persisted,
            is_valid: state.is_valid,
            has_changes: state.has_changes(),
            is_saving: state.is_saving,
            error: state.error.clone(),
        }
    }

    #[must_use]
    pub fn profile(&self) -> SensitivityProfile {
        lock(&self.inner.state).profile
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        lock(&self.inner.state).has_changes()
    }

    /// Edit one category. The value is rounded and clamped to `[1, 10]`.
    pub fn set_category(&self, category: PollenCategory, value: f64) -> SensitivityProfile {
        let mut update = SensitivityUpdate::default();
        match category {
            PollenCategory::Tree => update.tree = Some(value),
            PollenCategory::Grass => update.grass = Some(value),
            PollenCategory::Weed => update.weed = Some(value),
        }
        self.set_profile(update)
    }

    /// Edit one category from slider or text input
    pub fn set_category_input(
        &self,
        category: PollenCategory,
        input: &str,
    ) -> Result<SensitivityProfile, SensitivityError> {
        match parse_sensitivity_input(input) {
            Ok(value) => Ok(self.set_category(category, value)),
            Err(err) => {
                lock(&self.inner.state).error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Merge a partial edit into the current profile
    pub fn set_profile(&self, update: SensitivityUpdate) -> SensitivityProfile {
        let current = self.profile();
        self.apply(update.apply_to(current))
    }

    /// Restore 5/5/5 as an ordinary edit
    pub fn reset_to_defaults(&self) -> SensitivityProfile {
        self.apply(SensitivityProfile::default())
    }

    /// Revert to the last persisted profile without I/O
    pub fn discard(&self) -> SensitivityProfile {
        let profile = {
            let mut state = lock(&self.inner.state);
            state.cancel_pending_save();
            state.profile = state.persisted;
            state.error = None;
            state.profile
        };
        let is_valid = self.inner.validator.validate(&profile).is_ok();
        lock(&self.inner.state).is_valid = is_valid;
        self.notify(SensitivityEvent::Changed { profile, is_valid });
        profile
    }

    fn apply(&self, profile: SensitivityProfile) -> SensitivityProfile {
        let validation = self.inner.validator.validate(&profile);
        let is_valid = validation.is_ok();

        let changed = {
            let mut state = lock(&self.inner.state);
            let changed = state.profile != profile;
            state.profile = profile;
            state.is_valid = is_valid;
            state.error = validation.err().map(SensitivityError::validation);

            if !state.has_changes() || !is_valid {
                state.cancel_pending_save();
            } else if self.inner.config.auto_save && !state.is_saving {
                self.schedule_save(&mut state);
            }
            changed
        };

        if changed {
            debug!("Sensitivity changed to {}", profile.request_key());
            self.notify(SensitivityEvent::Changed { profile, is_valid });
        }
        profile
    }

    /// Restart the debounce window. Only the final value of a burst is written.
    fn schedule_save(&self, state: &mut SensitivityState) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, auto-save skipped");
            return;
        };

        state.cancel_pending_save();
        state.save_generation += 1;
        let generation = state.save_generation;
        let token = CancellationToken::new();
        state.pending_save = Some((generation, token.clone()));

        let manager = self.clone();
        let delay = self.inner.config.debounce();
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => manager.auto_save(generation).await,
            }
        });
    }

    async fn auto_save(&self, generation: u64) {
        {
            let mut state = lock(&self.inner.state);
            let current = state
                .pending_save
                .as_ref()
                .is_some_and(|(pending, _)| *pending == generation);
            if !current {
                return;
            }
            state.pending_save = None;
        }
        if let Err(e) = self.save().await {
            warn!("Auto-save failed: {}", e);
        }
    }

    /// Persist pending changes. Saving nothing, or an invalid profile, succeeds without I/O.
    pub async fn save(&self) -> Result<SaveOutcome, SensitivityError> {
        let profile = {
            let mut state = lock(&self.inner.state);
            if state.is_saving {
                return Ok(SaveOutcome::AlreadySaving);
            }
            if !state.is_valid || !state.has_changes() {
                return Ok(SaveOutcome::NothingToSave);
            }
            state.cancel_pending_save();
            state.is_saving = true;
            state.profile
        };

        let result = save_json(self.inner.store.as_ref(), SENSITIVITY_KEY, &profile)
            .await
            .map_err(SensitivityError::from);

        {
            let mut state = lock(&self.inner.state);
            state.is_saving = false;
            match &result {
                Ok(()) => {
                    state.persisted = profile;
                    state.error = None;
                    // Edits made while the write was running
                    if self.inner.config.auto_save && state.is_valid && state.has_changes() {
                        self.schedule_save(&mut state);
                    }
                }
                Err(err) => state.error = Some(err.clone()),
            }
        }

        match result {
            Ok(()) => {
                info!("Saved sensitivity profile {}", profile.request_key());
                self.notify(SensitivityEvent::Saved(profile));
                Ok(SaveOutcome::Saved(profile))
            }
            Err(err) => {
                warn!("Failed to save sensitivity profile: {}", err);
                self.notify(SensitivityEvent::SaveFailed(err.clone()));
                Err(err)
            }
        }
    }

    fn notify(&self, event: SensitivityEvent) {
        let _ = self.inner.events.send(event);
    }
}
