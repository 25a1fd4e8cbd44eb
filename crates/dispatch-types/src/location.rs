//! Geographic coordinates reported by drivers.
//!
//! Coordinates are plain floating-point degrees. No range validation is
//! performed: the service trusts the reporting device. Distances are
//! computed on a flat plane (latitude and longitude treated as Cartesian
//! axes), which is adequate at city scale.

use serde::{Deserialize, Serialize};

/// A (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in degrees.
    #[serde(rename = "lon")]
    pub longitude: f64,
}

impl Location {
    /// Create a location from latitude and longitude degrees.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Squared planar distance to `other`.
    ///
    /// Preferred for ordering comparisons since it avoids the square root.
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let d_lat = self.latitude - other.latitude;
        let d_lon = self.longitude - other.longitude;
        d_lat.mul_add(d_lat, d_lon * d_lon)
    }

    /// Planar (non-geodesic) distance to `other`, in degrees.
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Whether both coordinates are neither NaN nor infinite.
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_is_euclidean() {
        let a = Location::new(0.0, 0.0);
        let b = Location::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert!((a.distance_squared(&b) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn finiteness_checks_both_coordinates() {
        assert!(Location::new(-90.0, 180.0).is_finite());
        assert!(!Location::new(f64::NAN, 0.0).is_finite());
        assert!(!Location::new(0.0, f64::NEG_INFINITY).is_finite());
    }

    #[test]
    fn serializes_with_short_field_names() {
        let loc = Location::new(42.875_799, 74.588_279);
        let json = serde_json::to_value(loc).unwrap();
        assert_eq!(json["lat"], 42.875_799);
        assert_eq!(json["lon"], 74.588_279);
    }
}
