//! Adaptive point-cloud surfacing.
//!
//! Instead of triangulating a voxel grid, every grid cell near the surface
//! seeds an octree walk. Each visited node that lies close enough to the
//! surface emits one point snapped onto it, then splits into eight children
//! at half the scale:
//!
//! ```text
//!  level 0      level 1          level 2
//!  +-------+    +---+---+        +-+-+-+-+
//!  |       |    | o | o |        |o|o|o|o|
//!  |   o   | -> +---+---+  ->    +-+-+-+-+  ...
//!  |       |    | o | o |        |o|o|o|o|
//!  +-------+    +---+---+        +-+-+-+-+
//! ```
//!
//! Finer levels are pushed outward along the normal so the levels form thin
//! nested shells, and [`partition_samples`] groups the result by level and
//! facing so a renderer can draw only the detail it needs.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, debug_span};

use crate::{
    bounds::{GridBounds, resolve_bounds},
    error::{Result, SurfacingError},
    field::DistanceField,
    mesh::{SamplePoint, fallback_normal},
    normal::snap_to_surface_with_normal,
    shading::ShadingFunction,
    types::{Point, Value, Vector},
};

/// Nodes farther than this many scales from the surface are pruned.
const SAMPLE_RANGE: Value = 1.5;

/// Parameters of the point-cloud path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    /// Octree depth, counting the root level.
    pub levels: u32,
    /// Point size relative to the node scale.
    pub point_size: Value,
    /// Distance the deepest level is pushed out along the normal.
    pub level_offset_range: Value,
    /// Root cells per world unit.
    pub resolution: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            levels: 3,
            point_size: 1.0,
            level_offset_range: 0.0,
            resolution: 2,
        }
    }
}

impl SamplingConfig {
    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_point_size(mut self, point_size: Value) -> Self {
        self.point_size = point_size;
        self
    }

    pub fn with_level_offset_range(mut self, level_offset_range: Value) -> Self {
        self.level_offset_range = level_offset_range;
        self
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 {
            return Err(SurfacingError::InvalidLevels(self.levels));
        }
        if self.resolution == 0 {
            return Err(SurfacingError::InvalidResolution(self.resolution));
        }
        Ok(())
    }

    /// Outward offset of points at `level`.
    pub fn level_offset(&self, level: u32) -> Value {
        level as Value * self.level_offset_range / self.levels as Value
    }
}

/// Child offsets in units of the child scale, Z slowest and X fastest.
fn subdivision_template() -> [Vector; 8] {
    std::array::from_fn(|i| {
        let sign = |bit: usize| if i & bit == 0 { -0.5 } else { 0.5 };
        Vector::new(sign(1), sign(2), sign(4))
    })
}

/// Samples the octree rooted at `center`.
///
/// Nodes are visited depth first with children in template order, and a node
/// whose distance exceeds `1.5 * scale` is dropped together with its subtree.
/// A node whose snap travels farther than half its scale emits no point but
/// still subdivides.
///
/// # Panics
/// Panics if `config.levels` is zero.
pub fn sample_point(
    field: &DistanceField,
    shading: &ShadingFunction,
    config: &SamplingConfig,
    scale: Value,
    level: u32,
    center: Point,
) -> Vec<SamplePoint> {
    assert!(config.levels > 0, "sampling levels must be positive");
    let template = subdivision_template();
    let mut points = Vec::new();
    let mut stack = vec![(center, scale, level)];

    while let Some((center, scale, level)) = stack.pop() {
        if field.distance(center).abs() > SAMPLE_RANGE * scale {
            continue;
        }

        let snap = snap_to_surface_with_normal(field, center);
        // A longer snap lands on a spot a neighbouring node already owns.
        if (snap.location - center).norm() <= scale / 2.0 {
            let normal = snap.normal.unwrap_or_else(fallback_normal);
            points.push(SamplePoint {
                location: snap.location + normal * config.level_offset(level),
                shading: shading(snap.location),
                normal,
                size: config.point_size * scale,
                level,
            });
        }

        if level + 1 < config.levels {
            let child_scale = scale / 2.0;
            stack.extend(
                template
                    .iter()
                    .rev()
                    .map(|offset| (center + offset * child_scale, child_scale, level + 1)),
            );
        }
    }

    points
}

/// Seeds [`sample_point`] at every cell of `bounds`, `config.resolution` cells per unit.
///
/// Cells are visited row-major (X fastest) and their points concatenated in
/// that order.
pub fn sample_form(
    field: &DistanceField,
    shading: &ShadingFunction,
    config: &SamplingConfig,
    bounds: &GridBounds,
) -> Result<Vec<SamplePoint>> {
    config.validate()?;
    bounds.check_size()?;

    let _span = debug_span!("sample_form", ?bounds, resolution = config.resolution).entered();
    let [dim_x, dim_y, dim_z] = bounds.sample_dimensions(config.resolution)?;
    let scale = 1.0 / config.resolution as Value;
    let start = Point::from(bounds.start.coords.cast::<Value>());

    let slice = dim_x * dim_y;
    let per_cell: Vec<Vec<SamplePoint>> = (0..slice * dim_z)
        .into_par_iter()
        .map(|i| {
            let z = i / slice;
            let y = (i % slice) / dim_x;
            let x = i % dim_x;
            let offset = nalgebra::Vector3::new(x, y, z).cast::<Value>() * scale;
            sample_point(field, shading, config, scale, 0, start + offset)
        })
        .collect();

    let points: Vec<SamplePoint> = per_cell.into_iter().flatten().collect();
    debug!(points = points.len(), "sampled form");
    Ok(points)
}

/// Dominant axis direction of a normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalSide {
    XPlus,
    XMinus,
    YPlus,
    YMinus,
    ZPlus,
    ZMinus,
}

impl NormalSide {
    pub const ALL: [NormalSide; 6] = [
        NormalSide::XPlus,
        NormalSide::XMinus,
        NormalSide::YPlus,
        NormalSide::YMinus,
        NormalSide::ZPlus,
        NormalSide::ZMinus,
    ];

    /// Classifies `normal` by its largest component; ties prefer X, then Y.
    pub fn of(normal: &Vector) -> Self {
        let abs = normal.abs();
        if abs.x >= abs.y && abs.x >= abs.z {
            if normal.x >= 0.0 { Self::XPlus } else { Self::XMinus }
        } else if abs.y >= abs.z {
            if normal.y >= 0.0 { Self::YPlus } else { Self::YMinus }
        } else if normal.z >= 0.0 {
            Self::ZPlus
        } else {
            Self::ZMinus
        }
    }

    /// The three sides whose points can face a viewer looking along `-facing`.
    pub fn visible_from(facing: &Vector) -> [NormalSide; 3] {
        [
            if facing.x > 0.0 { Self::XPlus } else { Self::XMinus },
            if facing.y > 0.0 { Self::YPlus } else { Self::YMinus },
            if facing.z > 0.0 { Self::ZPlus } else { Self::ZMinus },
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A point cloud ordered for level-of-detail rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// Level-0 points, then every `(side, level)` partition in order.
    pub points: Vec<SamplePoint>,
    /// Number of leading level-0 points.
    pub base_count: usize,
    /// `partitions[side][level]` is the number of points in that partition.
    pub partitions: Vec<Vec<usize>>,
}

impl PointCloud {
    /// Start offset into `points` of the base block and of every partition.
    pub fn volume_offsets(&self) -> Vec<usize> {
        let mut offsets = vec![0];
        let mut running = self.base_count;
        for count in self.partitions.iter().flatten() {
            offsets.push(running);
            running += count;
        }
        offsets
    }
}

/// Orders `points` into level-0 points followed by detail points grouped by
/// facing side, then by level.
pub fn partition_samples(levels: u32, points: Vec<SamplePoint>) -> PointCloud {
    let levels = levels as usize;
    let (base, details): (Vec<_>, Vec<_>) = points.into_iter().partition(|p| p.level == 0);

    let mut groups: Vec<Vec<Vec<SamplePoint>>> = vec![vec![Vec::new(); levels]; NormalSide::ALL.len()];
    for point in details {
        let level = point.level as usize;
        debug_assert!(level < levels, "point level {level} exceeds {levels} levels");
        if let Some(group) = groups[NormalSide::of(&point.normal).index()].get_mut(level) {
            group.push(point);
        }
    }

    let partitions = groups
        .iter()
        .map(|side| side.iter().map(Vec::len).collect())
        .collect();
    let base_count = base.len();
    let mut ordered = base;
    ordered.extend(groups.into_iter().flatten().flatten());

    PointCloud {
        points: ordered,
        base_count,
        partitions,
    }
}

/// Surfaces `field` as a partitioned point cloud, resolving its bounds first.
pub fn point_cloud(field: &DistanceField, shading: &ShadingFunction, config: &SamplingConfig) -> Result<PointCloud> {
    config.validate()?;
    let bounds = resolve_bounds(field, 1.0, 1)?;
    let points = sample_form(field, shading, config, &bounds)?;
    Ok(partition_samples(config.levels, points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::sphere,
        shading::{Shading, constant_shading},
        types::GridPoint,
    };
    use approx::assert_abs_diff_eq;

    fn white() -> std::sync::Arc<ShadingFunction> {
        constant_shading(Shading::default())
    }

    #[test]
    fn template_covers_every_octant() {
        let template = subdivision_template();
        assert_eq!(template[0], Vector::repeat(-0.5));
        assert_eq!(template[1], Vector::new(0.5, -0.5, -0.5));
        assert_eq!(template[7], Vector::repeat(0.5));
        assert_eq!(template.iter().sum::<Vector>(), Vector::zeros());
    }

    #[test]
    fn single_level_emits_one_snapped_point() {
        let config = SamplingConfig::default().with_levels(1).with_point_size(2.0);
        let points = sample_point(&sphere(1.0), &*white(), &config, 0.5, 0, Point::new(1.1, 0.0, 0.0));
        assert_eq!(points.len(), 1);
        assert_abs_diff_eq!(points[0].location, Point::new(1.0, 0.0, 0.0), epsilon = 1e-3);
        assert_abs_diff_eq!(points[0].normal, Vector::x(), epsilon = 1e-3);
        assert_eq!(points[0].size, 1.0);
    }

    #[test]
    fn distant_nodes_are_pruned() {
        let config = SamplingConfig::default();
        let points = sample_point(&sphere(1.0), &*white(), &config, 0.5, 0, Point::new(3.0, 0.0, 0.0));
        assert!(points.is_empty());
    }

    #[test]
    fn finer_levels_form_an_outer_shell() {
        let config = SamplingConfig::default()
            .with_levels(2)
            .with_level_offset_range(0.5);
        let points = sample_point(&sphere(1.0), &*white(), &config, 1.0, 0, Point::new(1.0, 0.0, 0.0));
        // Only the four inner children sit within a quarter unit of the surface.
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].level, 0);
        assert_abs_diff_eq!(points[0].location.coords.norm(), 1.0, epsilon = 1e-3);
        for point in &points[1..] {
            assert_eq!(point.level, 1);
            assert!(point.normal.x > 0.0 && point.location.x < 1.25);
            assert_eq!(point.size, 0.5);
            assert_abs_diff_eq!(point.location.coords.norm(), 1.25, epsilon = 1e-3);
        }
    }

    #[test]
    fn long_snaps_emit_nothing() {
        let config = SamplingConfig::default().with_levels(1);
        let field = sphere(1.2);
        assert_eq!(sample_point(&field, &*white(), &config, 0.5, 0, Point::new(1.0, 0.0, 0.0)).len(), 1);
        assert!(sample_point(&field, &*white(), &config, 0.5, 0, Point::new(1.5, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn neighbouring_cells_do_not_repeat_points() {
        let field = sphere(1.2);
        let bounds = resolve_bounds(&field, 1.0, 1).unwrap();
        let config = SamplingConfig::default().with_levels(2);
        let points = sample_form(&field, &*white(), &config, &bounds).unwrap();
        let distinct: std::collections::HashSet<[i64; 3]> = points
            .iter()
            .map(|p| {
                let c = p.location.coords;
                [c.x, c.y, c.z].map(|v| (v * 1000.0).round() as i64)
            })
            .collect();
        assert!(!points.is_empty());
        assert_eq!(distinct.len(), points.len());
    }

    #[test]
    fn sampled_form_hugs_the_surface() {
        let field = sphere(1.5);
        let bounds = GridBounds::new(GridPoint::new(-2, -2, -2), GridPoint::new(2, 2, 2));
        let config = SamplingConfig::default().with_levels(2);
        let points = sample_form(&field, &*white(), &config, &bounds).unwrap();
        assert!(!points.is_empty());
        for point in &points {
            assert_abs_diff_eq!(point.location.coords.norm(), 1.5, epsilon = 1e-2);
        }
    }

    #[test]
    fn invalid_configs_fail_before_sampling() {
        let bounds = GridBounds::new(GridPoint::new(0, 0, 0), GridPoint::new(1, 1, 1));
        let no_levels = SamplingConfig::default().with_levels(0);
        assert_eq!(
            sample_form(&sphere(1.0), &*white(), &no_levels, &bounds),
            Err(SurfacingError::InvalidLevels(0))
        );
        let no_resolution = SamplingConfig::default().with_resolution(0);
        assert_eq!(
            point_cloud(&sphere(1.0), &*white(), &no_resolution),
            Err(SurfacingError::InvalidResolution(0))
        );

        let wide = GridBounds::new(GridPoint::new(0, 0, 0), GridPoint::new(101, 1, 1));
        assert!(sample_form(&sphere(1.0), &*white(), &SamplingConfig::default(), &wide).is_err());

        let dense = SamplingConfig::default().with_resolution(u32::MAX);
        assert!(matches!(
            sample_form(&sphere(1.0), &*white(), &dense, &bounds),
            Err(SurfacingError::Unbounded { .. })
        ));
    }

    #[test]
    fn sides_follow_the_dominant_axis() {
        assert_eq!(NormalSide::of(&Vector::new(0.1, -0.9, 0.2)), NormalSide::YMinus);
        assert_eq!(NormalSide::of(&Vector::new(0.5, 0.5, 0.0)), NormalSide::XPlus);
        assert_eq!(NormalSide::of(&Vector::new(0.0, 0.0, -1.0)), NormalSide::ZMinus);
        assert_eq!(
            NormalSide::visible_from(&Vector::new(1.0, -1.0, 0.0)),
            [NormalSide::XPlus, NormalSide::YMinus, NormalSide::ZMinus]
        );
    }

    #[test]
    fn partitions_group_by_side_then_level() {
        let point = |x: Value, level| SamplePoint {
            location: Point::origin(),
            shading: Shading::default(),
            normal: Vector::new(x, 0.0, 0.0),
            size: 1.0,
            level,
        };
        let cloud = partition_samples(3, vec![point(-1.0, 2), point(1.0, 0), point(1.0, 1), point(-1.0, 1)]);

        assert_eq!(cloud.base_count, 1);
        assert_eq!(cloud.partitions.len(), 6);
        assert_eq!(cloud.partitions[NormalSide::XPlus.index()], vec![0, 1, 0]);
        assert_eq!(cloud.partitions[NormalSide::XMinus.index()], vec![0, 1, 1]);
        let levels: Vec<_> = cloud.points.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![0, 1, 1, 2]);

        let offsets = cloud.volume_offsets();
        assert_eq!(offsets.len(), 1 + 18);
        assert_eq!(&offsets[..7], &[0, 1, 1, 2, 2, 2, 3]);
        assert_eq!(*offsets.last().unwrap(), 4);
    }
}
