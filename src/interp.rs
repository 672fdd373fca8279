use crate::types::{GridPoint, Point, Value};

// Return the interpolation factor t corresponding to iso_val
pub fn find_t(v0: Value, v1: Value, iso_val: Value) -> Value {
    (iso_val - v0) / (v1 - v0)
}

// Linearly interpolate between two points by factor t
pub fn interpolate_points(p0: Point, p1: Point, t: Value) -> Point {
    p0 + (p1 - p0) * t
}

/// Converts a grid corner into a world-space point.
///
/// ```text
///  world = origin + corner * voxel_size
/// ```
pub fn grid_to_world(corner: GridPoint, voxel_size: Value, origin: Point) -> Point {
    origin + corner.coords.cast::<Value>() * voxel_size
}
