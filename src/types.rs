use nalgebra::{Point3, Vector3};

/// Scalar field value at a point in space.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Point3<Value>;

/// A 3D vector with [`Value`] components.
pub type Vector = Vector3<Value>;

/// An integer grid corner, in whole voxels.
pub type GridPoint = Point3<i32>;

/// Identifies the primitive or model that owns the nearest surface.
pub type SurfaceId = u32;

/// Surface id of anything that was never tagged.
pub const ANONYMOUS_SURFACE: SurfaceId = 0;

/// A scalar sampler: maps a [`Point`] to a [`Value`].
///
/// Used as the secondary field of a deformation and for shading inputs.
pub type CompiledFunction = dyn Fn(Point) -> Value + Send + Sync;

/// One evaluation of a distance field.
///
/// `distance` is negative inside, zero on the surface and positive outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    pub id: SurfaceId,
    pub distance: Value,
}

impl DistanceSample {
    pub fn new(id: SurfaceId, distance: Value) -> Self {
        Self { id, distance }
    }

    pub fn anonymous(distance: Value) -> Self {
        Self::new(ANONYMOUS_SURFACE, distance)
    }
}
