//! Bounding boxes approximating a geodesic circle.

use super::point::{GeoPoint, EARTH_RADIUS};

/// Relative widening applied to every box so that floating point rounding
/// can never exclude a point lying exactly on the circle.
const MARGIN: f64 = 1e-9;

/// Longitude/latitude rectangle as `([min_lon, min_lat], [max_lon, max_lat])`.
pub type Envelope = ([f64; 2], [f64; 2]);

/// One or two rectangles covering all points within a radius of a center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBox {
    primary: Envelope,
    wrapped: Option<Envelope>,
}

impl RangeBox {
    /// Build the box covering every point within `radius` meters of `center`.
    ///
    /// The latitude delta is `radius / R`. The longitude delta is the exact
    /// maximum for a spherical cap, `asin(sin δ / cos φ)`, which grows with
    /// the cosine of the query latitude; once a pole is within reach the box
    /// spans all longitudes instead of growing without bound.
    pub fn around(center: GeoPoint, radius: f64) -> Self {
        let radius = radius.max(0.0);
        let delta = radius / EARTH_RADIUS * (1.0 + MARGIN) + MARGIN;
        let delta_deg = delta.to_degrees();

        let lat = center.latitude;
        let min_lat = (lat - delta_deg).max(-90.0);
        let max_lat = (lat + delta_deg).min(90.0);

        let pole_in_reach = lat + delta_deg >= 90.0 || lat - delta_deg <= -90.0;
        let ratio = delta.sin() / lat.to_radians().cos();
        if pole_in_reach || !ratio.is_finite() || ratio >= 1.0 {
            return Self {
                primary: ([-180.0, min_lat], [180.0, max_lat]),
                wrapped: None,
            };
        }

        let delta_lon = (ratio.asin().to_degrees()) * (1.0 + MARGIN) + MARGIN;
        if delta_lon >= 180.0 {
            return Self {
                primary: ([-180.0, min_lat], [180.0, max_lat]),
                wrapped: None,
            };
        }

        let min_lon = center.longitude - delta_lon;
        let max_lon = center.longitude + delta_lon;

        if min_lon < -180.0 {
            Self {
                primary: ([-180.0, min_lat], [max_lon, max_lat]),
                wrapped: Some(([min_lon + 360.0, min_lat], [180.0, max_lat])),
            }
        } else if max_lon > 180.0 {
            Self {
                primary: ([min_lon, min_lat], [180.0, max_lat]),
                wrapped: Some(([-180.0, min_lat], [max_lon - 360.0, max_lat])),
            }
        } else {
            Self {
                primary: ([min_lon, min_lat], [max_lon, max_lat]),
                wrapped: None,
            }
        }
    }

    /// The rectangles making up this box (one, or two at the antimeridian).
    pub fn envelopes(self) -> impl Iterator<Item = Envelope> {
        std::iter::once(self.primary).chain(self.wrapped)
    }

    /// Returns true if the point lies inside any of the rectangles.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.envelopes().any(|(min, max)| {
            (min[0]..=max[0]).contains(&point.longitude)
                && (min[1]..=max[1]).contains(&point.latitude)
        })
    }
}
