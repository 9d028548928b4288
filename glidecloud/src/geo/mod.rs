//! Geographic primitives.
//!
//! The tracking server needs only a handful of geodesic operations: a point
//! type in degrees, great-circle distance on the FAI sphere, and the
//! bounding boxes used to pre-select candidates for "near me" queries.
//!
//! # Range boxes
//!
//! [`RangeBox`] converts a linear radius around a point into one or two
//! latitude/longitude rectangles. The rectangles always contain the full
//! geodesic circle (they over-include near the corners, never under-include),
//! widen to the whole longitude band when a pole is within reach, and split
//! in two when the circle crosses the antimeridian.

mod point;
mod range;

pub use point::{GeoPoint, EARTH_RADIUS};
pub use range::RangeBox;
