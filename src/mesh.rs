use std::collections::{HashMap, hash_map::Entry};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, debug_span};

use crate::{
    bounds::{GridBounds, resolve_bounds},
    error::{Result, SurfacingError},
    field::DistanceField,
    interp::{grid_to_world, interpolate_points},
    marching::{EdgeCrossing, MarchingEdge, MarchingTriangle, triangulate},
    normal::normal_or,
    shading::{Shading, ShadingFunction},
    types::{Point, Value, Vector},
    voxel::{ISO_LEVEL, voxelize},
};

/// Normal given to vertices where the field has no usable gradient.
pub fn fallback_normal() -> Vector {
    Vector::z()
}

/// A shaded point on a surface: a mesh vertex or a point-cloud element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub location: Point,
    pub shading: Shading,
    /// Unit length.
    pub normal: Vector,
    pub size: Value,
    /// Octree depth for point clouds; always `0` for mesh vertices.
    pub level: u32,
}

/// Indexed triangle mesh produced by the marching cubes path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdfMesh {
    /// One vertex per distinct edge crossing.
    pub vertices: Vec<SamplePoint>,
    /// Index triples into `vertices`.
    pub triangles: Vec<[u32; 3]>,
}

impl SdfMesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.vertices.iter().map(|v| v.location.coords.into()).collect()
    }

    pub fn normals(&self) -> Vec<[f32; 3]> {
        self.vertices.iter().map(|v| v.normal.into()).collect()
    }

    pub fn colors(&self) -> Vec<[f32; 4]> {
        self.vertices.iter().map(|v| v.shading.rgba()).collect()
    }

    pub fn flat_indices(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }
}

/// Deduplicates edge crossings into vertices and indexes the triangles.
///
/// Vertices appear in the order their edge was first referenced; a repeated
/// edge keeps the fraction from its first occurrence. Grid corners map to
/// world space as `origin + corner / voxels_per_unit`.
pub fn assemble(
    triangles: &[MarchingTriangle],
    field: &DistanceField,
    shading: &ShadingFunction,
    voxels_per_unit: u32,
    origin: Point,
) -> SdfMesh {
    let _span = debug_span!("assemble", triangles = triangles.len()).entered();

    let mut lookup: HashMap<MarchingEdge, u32> = HashMap::with_capacity(triangles.len() * 3 / 2);
    let mut crossings: Vec<EdgeCrossing> = Vec::with_capacity(triangles.len() * 3 / 2);
    let indexed = triangles
        .iter()
        .map(|triangle| {
            triangle.map(|crossing| match lookup.entry(crossing.edge) {
                Entry::Occupied(entry) => *entry.get(),
                Entry::Vacant(entry) => {
                    let index = crossings.len() as u32;
                    crossings.push(crossing);
                    *entry.insert(index)
                }
            })
        })
        .collect();

    let voxel_size = 1.0 / voxels_per_unit as Value;
    let vertices = crossings
        .par_iter()
        .map(|crossing| {
            let a = grid_to_world(crossing.edge.first, voxel_size, origin);
            let b = grid_to_world(crossing.edge.second, voxel_size, origin);
            let location = interpolate_points(a, b, crossing.alpha);
            SamplePoint {
                location,
                shading: shading(location),
                normal: normal_or(field, location, fallback_normal()),
                size: 1.0,
                level: 0,
            }
        })
        .collect();

    debug!(vertices = crossings.len(), "assembled mesh");
    SdfMesh {
        vertices,
        triangles: indexed,
    }
}

/// Runs the marching cubes path over known bounds.
pub fn marching_mesh_in(
    voxels_per_unit: u32,
    field: &DistanceField,
    shading: &ShadingFunction,
    bounds: &GridBounds,
) -> Result<SdfMesh> {
    if voxels_per_unit == 0 {
        return Err(SurfacingError::InvalidVoxelsPerUnit(voxels_per_unit));
    }
    bounds.check_size()?;
    bounds.sample_dimensions(voxels_per_unit)?;

    let _span = debug_span!("marching_mesh", voxels_per_unit).entered();
    let grid = voxelize(field, bounds, voxels_per_unit);
    let triangles = triangulate(grid.as_slice(), grid.dimensions(), ISO_LEVEL);
    Ok(assemble(&triangles, field, shading, voxels_per_unit, grid.origin))
}

/// Surfaces `field` as a triangle mesh, resolving its bounds first.
///
/// Bounds are found with 1-unit cells and padded by one cell so the outermost
/// surface crossings are not clipped by the grid edge.
pub fn marching_mesh(voxels_per_unit: u32, field: &DistanceField, shading: &ShadingFunction) -> Result<SdfMesh> {
    if voxels_per_unit == 0 {
        return Err(SurfacingError::InvalidVoxelsPerUnit(voxels_per_unit));
    }
    let bounds = resolve_bounds(field, 1.0, 1)?;
    marching_mesh_in(voxels_per_unit, field, shading, &bounds)
}
