//! Coordinate reference systems: WKT parsing, projection math and the
//! feature reprojection engine. The destination is always geographic WGS84,
//! longitude first, in degrees.

pub mod projection;
pub mod reproject;
pub mod system;
pub mod transform;
pub mod wkt;

pub use reproject::{ReprojectionEngine, ReprojectionPolicy};
pub use system::CoordinateSystem;
pub use transform::CoordinateTransform;
