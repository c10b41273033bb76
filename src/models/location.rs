//! Location model for geographic coordinates and metadata

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LocationError;

/// A validated latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Validate and build a coordinate pair. Out-of-range values are rejected, never coerced.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationError::invalid(format!(
                "Latitude must be between -90 and 90, got: {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::invalid(format!(
                "Longitude must be between -180 and 180, got: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Format coordinates as a display string
    #[must_use]
    pub fn format(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinates {
    type Err = LocationError;

    /// Parse coordinates from text like "46.8182,8.2275" or "46.8182 8.2275"
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input
            .trim()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.len() != 2 {
            return Err(LocationError::invalid(
                "Coordinates must be in format 'lat,lon'",
            ));
        }

        let lat = parts[0]
            .parse::<f64>()
            .map_err(|_| LocationError::invalid(format!("Invalid latitude: {}", parts[0])))?;
        let lon = parts[1]
            .parse::<f64>()
            .map_err(|_| LocationError::invalid(format!("Invalid longitude: {}", parts[1])))?;

        Self::new(lat, lon)
    }
}

/// How a location came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    /// Detected by the platform geolocation service
    Auto,
    /// Entered or picked by the user
    Manual,
}

/// A user location with optional display metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Display name (saved name or place name)
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub source: LocationSource,
    /// When the position was detected; `None` for manual entries
    pub timestamp: Option<DateTime<Utc>>,
    /// Reported accuracy in meters; `None` for manual entries
    pub accuracy_m: Option<f64>,
}

impl Location {
    /// Create a new manually entered location
    pub fn manual(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        let coordinates = Coordinates::new(latitude, longitude)?;
        Ok(Self::from_coordinates(coordinates, LocationSource::Manual))
    }

    /// Create a detected location carrying its detection metadata
    #[must_use]
    pub fn detected(coordinates: Coordinates, timestamp: DateTime<Utc>, accuracy_m: Option<f64>) -> Self {
        Self {
            timestamp: Some(timestamp),
            accuracy_m,
            ..Self::from_coordinates(coordinates, LocationSource::Auto)
        }
    }

    #[must_use]
    pub fn from_coordinates(coordinates: Coordinates, source: LocationSource) -> Self {
        Self {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            name: None,
            address: None,
            city: None,
            region: None,
            source,
            timestamp: None,
            accuracy_m: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Re-check the coordinate bounds, e.g. after deserializing persisted data
    pub fn validate(&self) -> Result<(), LocationError> {
        Coordinates::new(self.latitude, self.longitude).map(|_| ())
    }

    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        self.coordinates().format()
    }

    /// Best human-readable label: name, then city and region, then raw coordinates
    #[must_use]
    pub fn display_label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        match (self.city.as_deref(), self.region.as_deref()) {
            (Some(city), Some(region)) => format!("{city}, {region}"),
            (Some(city), None) => city.to_string(),
            _ => self.format_coordinates(),
        }
    }

    /// Round coordinates for request keys
    #[must_use]
    pub fn rounded_coordinates(&self, precision: u32) -> (f64, f64) {
        let multiplier = 10_f64.powi(i32::try_from(precision).unwrap_or(4));
        let lat = (self.latitude * multiplier).round() / multiplier;
        let lon = (self.longitude * multiplier).round() / multiplier;
        (lat, lon)
    }
}

/// A result from a place search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl PlaceResult {
    /// Convert into a manual location, rejecting out-of-range coordinates
    pub fn to_location(&self) -> Result<Location, LocationError> {
        let mut location = Location::manual(self.latitude, self.longitude)?;
        location.name = Some(self.name.clone());
        location.address = self.address.clone();
        location.city = self.city.clone().or_else(|| Some(self.name.clone()));
        location.region = self.region.clone();
        Ok(location)
    }
}

/// Persisted location preferences, one per installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSettings {
    pub current: Option<Location>,
    pub auto_detect: bool,
    /// Oldest first
    pub saved: Vec<Location>,
    pub last_detected_at: Option<DateTime<Utc>>,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            current: None,
            auto_detect: true,
            saved: Vec::new(),
            last_detected_at: None,
        }
    }
}

impl LocationSettings {
    /// Drop any entry whose coordinates are out of bounds
    pub fn retain_valid(&mut self) -> usize {
        let before = self.saved.len() + usize::from(self.current.is_some());
        if self.current.as_ref().is_some_and(|c| c.validate().is_err()) {
            self.current = None;
        }
        self.saved.retain(|l| l.validate().is_ok());
        before - (self.saved.len() + usize::from(self.current.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        let coords: Coordinates = "46.8182,8.2275".parse().unwrap();
        assert_eq!(coords.latitude, 46.8182);
        assert_eq!(coords.longitude, 8.2275);

        let coords: Coordinates = " 37.7749  -122.4194 ".parse().unwrap();
        assert_eq!(coords.longitude, -122.4194);
    }

    #[test]
    fn test_parse_coordinates_rejects_out_of_range() {
        let err = "91.0,8.0".parse::<Coordinates>().unwrap_err();
        assert_eq!(err.code(), "INVALID_LOCATION");

        let err = "45.0,-180.5".parse::<Coordinates>().unwrap_err();
        assert_eq!(err.code(), "INVALID_LOCATION");

        assert!("north,west".parse::<Coordinates>().is_err());
        assert!("1.0".parse::<Coordinates>().is_err());
        assert!("NaN,1.0".parse::<Coordinates>().is_err());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_display_label_fallbacks() {
        let mut location = Location::manual(46.8182, 8.2275).unwrap();
        assert_eq!(location.display_label(), "46.8182, 8.2275");

        location.city = Some("Interlaken".to_string());
        location.region = Some("Bern".to_string());
        assert_eq!(location.display_label(), "Interlaken, Bern");

        let location = location.with_name("Home");
        assert_eq!(location.display_label(), "Home");
    }

    #[test]
    fn test_location_rounded_coordinates() {
        let location = Location::manual(46.818_234_567, 8.227_456_789).unwrap();
        let (lat, lon) = location.rounded_coordinates(6);
        assert_eq!(lat, 46.818_235);
        assert_eq!(lon, 8.227_457);
    }

    #[test]
    fn test_place_result_becomes_manual_location() {
        let place = PlaceResult {
            name: "Zurich".to_string(),
            latitude: 47.3769,
            longitude: 8.5417,
            address: None,
            city: None,
            region: Some("Zurich".to_string()),
            country: Some("CH".to_string()),
        };
        let location = place.to_location().unwrap();
        assert_eq!(location.source, LocationSource::Manual);
        assert_eq!(location.city.as_deref(), Some("Zurich"));
        assert!(location.timestamp.is_none());
        assert!(location.accuracy_m.is_none());
    }

    #[test]
    fn test_settings_drop_invalid_entries() {
        let mut settings = LocationSettings::default();
        let mut bad = Location::manual(10.0, 10.0).unwrap();
        bad.latitude = 120.0;
        settings.saved = vec![bad.clone(), Location::manual(1.0, 1.0).unwrap()];
        settings.current = Some(bad);

        assert_eq!(settings.retain_valid(), 2);
        assert!(settings.current.is_none());
        assert_eq!(settings.saved.len(), 1);
    }
}
