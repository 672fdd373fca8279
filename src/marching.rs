use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, debug_span};

use crate::{
    interp::find_t,
    tables::{CORNER_OFFSETS, CORNER_POINT_INDICES, EDGE_TABLE, TRI_TABLE},
    types::{GridPoint, Value},
};

/// A grid edge between two adjacent corners, in canonical order.
///
/// The lexicographically smaller corner is always `first`, so every cube that
/// shares the edge produces the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarchingEdge {
    pub first: GridPoint,
    pub second: GridPoint,
}

impl MarchingEdge {
    /// Orders `a` and `b`, returning whether they were swapped.
    pub fn canonical(a: GridPoint, b: GridPoint) -> (Self, bool) {
        if corner_key(&a) > corner_key(&b) {
            (
                Self {
                    first: b,
                    second: a,
                },
                true,
            )
        } else {
            (
                Self {
                    first: a,
                    second: b,
                },
                false,
            )
        }
    }
}

#[inline]
fn corner_key(corner: &GridPoint) -> (i32, i32, i32) {
    (corner.x, corner.y, corner.z)
}

/// Where the iso-surface crosses an edge: `first + alpha * (second - first)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCrossing {
    pub alpha: Value,
    pub edge: MarchingEdge,
}

impl EdgeCrossing {
    /// Builds the crossing between corners `a` and `b` holding values `va` and `vb`.
    ///
    /// Corners (and their values) are put in canonical order before the
    /// fraction is computed, so both neighbours of an edge agree bit for bit.
    pub fn new(a: GridPoint, va: Value, b: GridPoint, vb: Value, iso_level: Value) -> Self {
        let (edge, swapped) = MarchingEdge::canonical(a, b);
        let (v0, v1) = if swapped { (vb, va) } else { (va, vb) };
        Self {
            alpha: find_t(v0, v1, iso_level),
            edge,
        }
    }
}

/// Three edge crossings forming one triangle, before vertex deduplication.
pub type MarchingTriangle = [EdgeCrossing; 3];

/// Computes the marching cubes state bitmask for a cube.
///
/// Each of the 8 corners maps to one bit. A bit is set when the corner's value
/// is **above** the iso-level (i.e. occupied):
///
/// ```text
/// corner index:  7  6  5  4  3  2  1  0
/// state bits:   [_][_][_][_][_][_][_][_]
///                                      ^-- corner 0 occupied?
/// ```
#[inline]
pub fn cube_state(corner_values: &[Value; 8], iso_level: Value) -> usize {
    corner_values
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v > iso_level)
        .fold(0, |state, (i, _)| state | 1 << i)
}

/// Returns the 8 grid corners of the cube whose minimum corner is `(x, y, z)`.
#[inline]
pub fn cube_corners(x: usize, y: usize, z: usize) -> [GridPoint; 8] {
    let base = GridPoint::new(x as i32, y as i32, z as i32);
    CORNER_OFFSETS.map(|[dx, dy, dz]| base + nalgebra::Vector3::new(dx, dy, dz))
}

/// Converts one cube into triangles.
///
/// `TRI_TABLE[state]` contains edge indices in groups of three, terminated by `-1`:
/// ```text
/// TRI_TABLE[state] = [e0, e1, e2,  e3, e4, e5,  -1, ...]
///                     \___tri0__/   \___tri1__/
/// ```
/// Walking stops at the sentinel, never past the row. Rows wind clockwise when
/// seen from outside, so each triangle is emitted reversed to face outward
/// under counter-clockwise culling.
pub fn march_cube(
    corners: &[GridPoint; 8],
    corner_values: &[Value; 8],
    iso_level: Value,
    output: &mut Vec<MarchingTriangle>,
) {
    let state = cube_state(corner_values, iso_level);
    if EDGE_TABLE[state] == 0 {
        return;
    }

    let crossing = |edge: i8| {
        let [a, b] = CORNER_POINT_INDICES[edge as usize].map(|c| c as usize);
        EdgeCrossing::new(corners[a], corner_values[a], corners[b], corner_values[b], iso_level)
    };

    for triangle in TRI_TABLE[state]
        .chunks_exact(3)
        .take_while(|triangle| triangle[0] != -1)
    {
        output.push([crossing(triangle[0]), crossing(triangle[2]), crossing(triangle[1])]);
    }
}

/// Extracts the iso-surface of a row-major (X fastest) scalar grid.
///
/// `dimensions` counts grid points per axis, so the grid holds
/// `(dim_x - 1) × (dim_y - 1) × (dim_z - 1)` cubes. Cubes are processed in
/// parallel per Z layer and concatenated in layer order, so the output is
/// identical to a sequential sweep over `z`, `y`, `x`.
///
/// # Panics
/// Panics if `values` does not hold `dim_x * dim_y * dim_z` entries.
pub fn triangulate(values: &[Value], dimensions: [usize; 3], iso_level: Value) -> Vec<MarchingTriangle> {
    let [dim_x, dim_y, dim_z] = dimensions;
    assert_eq!(
        values.len(),
        dim_x * dim_y * dim_z,
        "grid values do not match dimensions {dimensions:?}"
    );
    if dim_x < 2 || dim_y < 2 || dim_z < 2 {
        return Vec::new();
    }

    let _span = debug_span!("triangulate", ?dimensions).entered();
    let index = |[x, y, z]: [i32; 3]| x as usize + dim_x * (y as usize + dim_y * z as usize);

    let per_z: Vec<Vec<MarchingTriangle>> = (0..dim_z - 1)
        .into_par_iter()
        .map(|z| {
            let mut local = Vec::new();
            for y in 0..dim_y - 1 {
                for x in 0..dim_x - 1 {
                    let corners = cube_corners(x, y, z);
                    let corner_values = corners.map(|c| values[index([c.x, c.y, c.z])]);
                    march_cube(&corners, &corner_values, iso_level, &mut local);
                }
            }
            local
        })
        .collect();

    // Merge per-Z layers into a single triangle list
    let total: usize = per_z.iter().map(Vec::len).sum();
    let mut triangles = Vec::with_capacity(total);
    for mut layer in per_z {
        triangles.append(&mut layer);
    }

    debug!(triangles = triangles.len(), "triangulated grid");
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uniform_grids_have_no_triangles() {
        assert!(triangulate(&[1.0; 27], [3, 3, 3], 0.5).is_empty());
        assert!(triangulate(&[0.0; 27], [3, 3, 3], 0.5).is_empty());
    }

    #[test]
    fn degenerate_grids_have_no_cubes() {
        assert!(triangulate(&[1.0, 0.0], [2, 1, 1], 0.5).is_empty());
        assert!(triangulate(&[], [0, 0, 0], 0.5).is_empty());
    }

    #[test]
    fn state_sets_bits_for_occupied_corners() {
        let values = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.6];
        assert_eq!(cube_state(&values, 0.5), 0b1000_0001);
        assert_eq!(cube_state(&[0.5; 8], 0.5), 0);
    }

    #[test]
    fn single_corner_makes_one_triangle() {
        let mut values = [0.0; 8];
        values[0] = 1.0;
        let triangles = triangulate(&values, [2, 2, 2], 0.5);
        assert_eq!(triangles.len(), 1);
        for crossing in triangles[0] {
            assert_eq!(crossing.edge.first, GridPoint::origin());
            assert_eq!(crossing.alpha, 0.5);
        }
    }

    #[test]
    fn canonical_edges_mirror_the_fraction() {
        let a = GridPoint::new(1, 0, 0);
        let b = GridPoint::new(0, 0, 0);
        let forward = EdgeCrossing::new(a, 0.0, b, 1.0, 0.25);
        let backward = EdgeCrossing::new(b, 1.0, a, 0.0, 0.25);
        assert_eq!(forward, backward);
        assert_eq!(forward.edge.first, b);
        assert_eq!(forward.alpha, 0.75);

        // Seen from `b`, the value climbs to 0.75 three quarters of the way to `a`.
        let skewed = EdgeCrossing::new(a, 1.0, b, 0.0, 0.75);
        assert_eq!(skewed.alpha, 0.75);
    }

    #[test]
    fn shared_edges_produce_identical_keys() {
        // Two cubes side by side along X, occupied only at the shared face's first corner.
        let dims = [3, 2, 2];
        let mut values = vec![0.0; 12];
        values[1] = 1.0;
        let triangles = triangulate(&values, dims, 0.5);
        assert_eq!(triangles.len(), 2);

        let crossings: Vec<_> = triangles.iter().flatten().collect();
        let keys: HashSet<_> = crossings.iter().map(|c| c.edge).collect();
        assert_eq!(crossings.len(), 6);
        // The Y and Z edges leaving corner (1, 0, 0) are shared by both cubes.
        assert_eq!(keys.len(), 4);
        for crossing in crossings {
            let twin = triangles
                .iter()
                .flatten()
                .filter(|other| other.edge == crossing.edge);
            for other in twin {
                assert_eq!(other.alpha, crossing.alpha);
            }
        }
    }

    #[test]
    fn output_order_is_deterministic() {
        let dims = [5, 4, 6];
        let values: Vec<Value> = (0..dims.iter().product::<usize>())
            .map(|i| ((i * 7919) % 13) as Value / 12.0)
            .collect();
        let first = triangulate(&values, dims, 0.5);
        let second = triangulate(&values, dims, 0.5);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}
