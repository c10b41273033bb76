//! Great-circle distance between coordinates
//!
//! Every caller works in meters; only display code converts to kilometers.

use haversine::{Location as HaversineLocation, Units, distance};

use crate::models::Coordinates;

/// Haversine distance in meters (Earth radius 6371 km)
#[must_use]
pub fn distance_meters(from: Coordinates, to: Coordinates) -> f64 {
    let from_haversine = HaversineLocation {
        latitude: from.latitude,
        longitude: from.longitude,
    };
    let to_haversine = HaversineLocation {
        latitude: to.latitude,
        longitude: to.longitude,
    };
    distance(from_haversine, to_haversine, Units::Kilometers) * 1000.0
}

/// Format a distance in meters for display
#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{meters:.0} m")
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}
