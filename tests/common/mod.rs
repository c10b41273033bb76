//! Mock collaborators shared by the integration suites

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use pollencast::error::{FetchError, GeolocationError, StorageError};
use pollencast::models::{
    CategoryMeasurement, Coordinates, Location, PollenCategory, RawDailyMeasurement,
};
use pollencast::providers::{
    DetectOptions, DetectedPosition, ForecastProvider, GeolocationDetector, KeyValueStore,
    PermissionState,
};

/// How the mock store answers writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Accept,
    Reject,
    Unavailable,
}

#[derive(Default)]
pub struct MockStore {
    entries: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    mode: Mutex<WriteMode>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_entry(key: &str, value: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Arc::new(store)
    }

    pub fn set_mode(&self, mode: WriteMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn writes_for(&self, key: &str) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MockStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        match *self.mode.lock().unwrap() {
            WriteMode::Accept => {}
            WriteMode::Reject => return Err(StorageError::rejected("write returned false")),
            WriteMode::Unavailable => return Err(StorageError::unavailable("quota exceeded")),
        }
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.clone()));
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Detector answering from a queue of canned results
pub struct MockDetector {
    supported: bool,
    results: Mutex<Vec<Result<DetectedPosition, GeolocationError>>>,
    /// Calls with an index below this hold until cancelled
    hang_calls: usize,
    pub calls: AtomicUsize,
    permission: Mutex<Result<PermissionState, GeolocationError>>,
}

impl MockDetector {
    pub fn supported() -> Self {
        Self {
            supported: true,
            results: Mutex::new(Vec::new()),
            hang_calls: 0,
            calls: AtomicUsize::new(0),
            permission: Mutex::new(Ok(PermissionState::Granted)),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::supported()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang_calls: usize::MAX,
            ..Self::supported()
        }
    }

    /// The first detection hangs, later ones answer from the queue
    pub fn hanging_once() -> Self {
        Self {
            hang_calls: 1,
            ..Self::supported()
        }
    }

    pub fn then_position(self, latitude: f64, longitude: f64) -> Self {
        self.results.lock().unwrap().push(Ok(position(latitude, longitude)));
        self
    }

    pub fn then_error(self, error: GeolocationError) -> Self {
        self.results.lock().unwrap().push(Err(error));
        self
    }

    pub fn set_permission(&self, permission: Result<PermissionState, GeolocationError>) {
        *self.permission.lock().unwrap() = permission;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn position(latitude: f64, longitude: f64) -> DetectedPosition {
    DetectedPosition {
        coordinates: Coordinates::new(latitude, longitude).unwrap(),
        accuracy_m: Some(25.0),
        timestamp: Utc::now(),
    }
}

#[async_trait]
impl GeolocationDetector for MockDetector {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn detect(
        &self,
        _options: DetectOptions,
        cancel: CancellationToken,
    ) -> Result<DetectedPosition, GeolocationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.hang_calls {
            cancel.cancelled().await;
            return Err(GeolocationError::Aborted);
        }
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            return Err(GeolocationError::Unavailable("no canned position".to_string()));
        }
        results.remove(0)
    }

    async fn permission_state(&self) -> Result<PermissionState, GeolocationError> {
        self.permission.lock().unwrap().clone()
    }
}

/// Forecast provider returning the same days for every request
pub struct MockProvider {
    days: Mutex<Result<Vec<RawDailyMeasurement>, FetchError>>,
    calls: AtomicUsize,
    /// When set, each fetch waits for a notification (or cancellation)
    gate: Option<Arc<Notify>>,
}

impl MockProvider {
    pub fn returning(days: Vec<RawDailyMeasurement>) -> Self {
        Self {
            days: Mutex::new(Ok(days)),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            days: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn gated(days: Vec<RawDailyMeasurement>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::returning(days)
        }
    }

    pub fn set_days(&self, days: Vec<RawDailyMeasurement>) {
        *self.days.lock().unwrap() = Ok(days);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastProvider for MockProvider {
    async fn fetch(
        &self,
        _location: &Location,
        days: u32,
        cancel: CancellationToken,
    ) -> Result<Vec<RawDailyMeasurement>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Aborted),
                () = gate.notified() => {}
            }
        }
        let result = self.days.lock().unwrap().clone();
        result.map(|all| all.into_iter().take(days as usize).collect())
    }
}

/// One forecast day with the given tree/grass/weed indices, all in season
pub fn day(offset: u32, tree: f64, grass: f64, weed: f64) -> RawDailyMeasurement {
    let date = NaiveDate::from_ymd_opt(2024, 4, 15 + offset).unwrap();
    RawDailyMeasurement::new(
        date,
        vec![
            CategoryMeasurement::new(PollenCategory::Tree, tree, true),
            CategoryMeasurement::new(PollenCategory::Grass, grass, true),
            CategoryMeasurement::new(PollenCategory::Weed, weed, true),
        ],
    )
}

pub fn san_francisco() -> Location {
    Location::manual(37.7749, -122.4194).unwrap()
}
