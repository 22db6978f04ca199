// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Coordinates and great-circle distance

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, SmugvisionError};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

/// Cache key for a coordinate rounded to a fixed number of decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    lat: i64,
    lon: i64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(SmugvisionError::Config(format!(
                "Invalid latitude: {}. Must be between -90 and 90.",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(SmugvisionError::Config(format!(
                "Invalid longitude: {}. Must be between -180 and 180.",
                longitude
            )));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Haversine distance to another coordinate, in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let (lat1, lon1) = (self.latitude.to_radians(), self.longitude.to_radians());
        let (lat2, lon2) = (other.latitude.to_radians(), other.longitude.to_radians());

        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_M * c
    }

    /// Round to `precision` decimal places for cache lookups
    pub fn cache_key(&self, precision: u32) -> CoordinateKey {
        let scale = 10f64.powi(precision as i32);
        CoordinateKey {
            lat: (self.latitude * scale).round() as i64,
            lon: (self.longitude * scale).round() as i64,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_distance_known_pair() {
        // Golden Gate Bridge to Alcatraz is roughly 4.9km
        let bridge = Coordinate::new(37.8199, -122.4783).unwrap();
        let alcatraz = Coordinate::new(37.8267, -122.4230).unwrap();
        let d = bridge.distance_to(&alcatraz);
        assert!((4_800.0..5_200.0).contains(&d), "distance was {}", d);
        assert_eq!(bridge.distance_to(&bridge), 0.0);
    }

    #[test]
    fn test_cache_key_rounding() {
        let a = Coordinate::new(38.123456, -85.654321).unwrap();
        let b = Coordinate::new(38.1234561, -85.6543209).unwrap();
        let c = Coordinate::new(38.12347, -85.654321).unwrap();
        assert_eq!(a.cache_key(5), b.cache_key(5));
        assert_ne!(a.cache_key(5), c.cache_key(5));
    }

    #[test]
    fn test_display() {
        let c = Coordinate::new(38.1, -85.2).unwrap();
        assert_eq!(c.to_string(), "38.100000, -85.200000");
    }
}
