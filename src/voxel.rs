use ndarray::Array3;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::debug_span;

use crate::{
    bounds::GridBounds,
    field::DistanceField,
    types::{Point, Value},
};

/// Iso-level the occupancy grid is triangulated at.
pub const ISO_LEVEL: Value = 0.5;

/// A dense occupancy grid sampled from a distance field.
///
/// Values are stored in an [`Array3`] shaped `(z, y, x)` in standard layout,
/// so the flat slice is row-major with X varying fastest:
///
/// ```text
/// index = x + dim_x * (y + dim_y * z)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    /// World-space position of grid index `(0, 0, 0)`.
    pub origin: Point,
    /// World-space size of each voxel edge.
    pub voxel_size: Value,
    values: Array3<Value>,
}

impl VoxelGrid {
    /// Wraps an existing row-major value buffer.
    ///
    /// # Panics
    /// Panics if `values.len()` is not `dim_x * dim_y * dim_z`.
    pub fn from_values(dimensions: [usize; 3], values: Vec<Value>) -> Self {
        let [x, y, z] = dimensions;
        let values = Array3::from_shape_vec((z, y, x), values)
            .unwrap_or_else(|err| panic!("voxel values do not match {dimensions:?}: {err}"));
        Self {
            origin: Point::origin(),
            voxel_size: 1.0,
            values,
        }
    }

    /// Sets the world-space placement of the grid.
    pub fn with_placement(mut self, origin: Point, voxel_size: Value) -> Self {
        self.origin = origin;
        self.voxel_size = voxel_size;
        self
    }

    /// Number of grid points along `[x, y, z]`.
    pub fn dimensions(&self) -> [usize; 3] {
        let (z, y, x) = self.values.dim();
        [x, y, z]
    }

    /// Returns the occupancy at grid index `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Value {
        self.values[[z, y, x]]
    }

    /// The flat, X-fastest value buffer.
    pub fn as_slice(&self) -> &[Value] {
        self.values
            .as_slice()
            .expect("voxel grid is always in standard layout")
    }
}

/// Softened occupancy: `1` deep inside, fading to `0` one voxel outside the surface.
#[inline]
pub fn occupancy(distance: Value, voxel_size: Value) -> Value {
    if distance <= voxel_size {
        (1.0 - distance / voxel_size).min(1.0)
    } else {
        0.0
    }
}

/// Samples `field` over `bounds` at `voxels_per_unit` grid points per world unit.
///
/// The grid has `(end - start) * voxels_per_unit` points per axis; point `i`
/// sits at `start + i / voxels_per_unit`. Sampling is parallel over grid
/// points but the result does not depend on scheduling.
///
/// # Panics
/// Panics if `voxels_per_unit` is zero.
pub fn voxelize(field: &DistanceField, bounds: &GridBounds, voxels_per_unit: u32) -> VoxelGrid {
    assert!(voxels_per_unit > 0, "voxels per unit must be positive");
    let _span = debug_span!("voxelize", ?bounds, voxels_per_unit).entered();

    let scale = voxels_per_unit as usize;
    let [cx, cy, cz] = bounds.dimensions();
    let (dim_x, dim_y, dim_z) = (cx * scale, cy * scale, cz * scale);
    let voxel_size = 1.0 / voxels_per_unit as Value;
    let origin = Point::from(bounds.start.coords.cast::<Value>());

    let slice = dim_x * dim_y;
    let values: Vec<Value> = (0..slice * dim_z)
        .into_par_iter()
        .map(|i| {
            let z = i / slice;
            let y = (i % slice) / dim_x;
            let x = i % dim_x;
            let offset = nalgebra::Vector3::new(x, y, z).cast::<Value>() * voxel_size;
            occupancy(field.distance(origin + offset), voxel_size)
        })
        .collect();

    VoxelGrid::from_values([dim_x, dim_y, dim_z], values).with_placement(origin, voxel_size)
}
