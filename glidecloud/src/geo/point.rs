//! Geographic point type.

use std::fmt;

/// Mean earth radius in meters (FAI sphere).
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// A position on the earth's surface in decimal degrees.
///
/// Positive latitude is north, positive longitude is east.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point from degrees.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both coordinates are finite and within range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to another point in meters (haversine).
    pub fn distance(&self, other: &GeoPoint) -> f64 {
        EARTH_RADIUS * self.central_angle(other)
    }

    /// Central angle to another point in radians.
    fn central_angle(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }

    /// Midpoint of the segment between two points.
    ///
    /// Uses a planar average, which is adequate for the short segments
    /// (wave axes) this is used for. Longitudes on opposite sides of the
    /// antimeridian are unwrapped first.
    pub fn midpoint(&self, other: &GeoPoint) -> GeoPoint {
        let mut lon2 = other.longitude;
        if lon2 - self.longitude > 180.0 {
            lon2 -= 360.0;
        } else if self.longitude - lon2 > 180.0 {
            lon2 += 360.0;
        }

        let mut longitude = (self.longitude + lon2) / 2.0;
        if longitude > 180.0 {
            longitude -= 360.0;
        } else if longitude < -180.0 {
            longitude += 360.0;
        }

        GeoPoint::new((self.latitude + other.latitude) / 2.0, longitude)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.latitude < 0.0 { 'S' } else { 'N' };
        let ew = if self.longitude < 0.0 { 'W' } else { 'E' };
        write!(
            f,
            "{:.5}{} {:.5}{}",
            self.latitude.abs(),
            ns,
            self.longitude.abs(),
            ew
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero() {
        let p = GeoPoint::new(47.0, 8.0);
        assert!(p.distance(&p) < 1e-6);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = GeoPoint::new(47.0, 8.0);
        let b = GeoPoint::new(48.0, 8.0);
        // One degree of arc on the FAI sphere
        let expected = EARTH_RADIUS * 1.0_f64.to_radians();
        assert!((a.distance(&b) - expected).abs() < 1.0);
    }

    #[test]
    fn test_distance_across_antimeridian() {
        let a = GeoPoint::new(0.0, 179.9);
        let b = GeoPoint::new(0.0, -179.9);
        let expected = EARTH_RADIUS * 0.2_f64.to_radians();
        assert!((a.distance(&b) - expected).abs() < 1.0);
    }

    #[test]
    fn test_is_valid() {
        assert!(GeoPoint::new(47.0, 8.0).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_midpoint() {
        let m = GeoPoint::new(46.0, 7.0).midpoint(&GeoPoint::new(47.0, 9.0));
        assert!((m.latitude - 46.5).abs() < 1e-9);
        assert!((m.longitude - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_midpoint_across_antimeridian() {
        let m = GeoPoint::new(0.0, 179.0).midpoint(&GeoPoint::new(0.0, -179.0));
        assert!((m.longitude.abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            format!("{}", GeoPoint::new(47.5, -122.25)),
            "47.50000N 122.25000W"
        );
    }
}
