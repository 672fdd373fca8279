//! Grid bounds resolution.
//!
//! The extent of a field's surface along each half-axis is found by probing
//! the field from far away on that axis: for a probe at distance `R`, the
//! nearest surface point lies at most `R - distance` along the axis. The six
//! extents are rounded outward to whole cells and padded.
//!
//! ```text
//!      -X probe            surface            +X probe
//!   o------------->    [=========]    <-------------o
//!   |<--- distance --->|         |<--- distance --->|
//! ```
//!
//! The result is approximate (it can undershoot surfaces that sit off the
//! probing axes), which is why callers pad it.

use tracing::{debug, warn};

use crate::{
    error::{Result, SurfacingError},
    field::DistanceField,
    types::{GridPoint, Point, Value, Vector},
};

/// Largest allowed extent, in cells, on any axis.
pub const MAX_BOUNDS_CELLS: i64 = 100;

/// Largest number of grid points a single sampling pass may allocate.
pub const MAX_GRID_POINTS: usize = 1 << 26;

/// Probe distance from the origin.
const PROBE_DISTANCE: Value = 10_000.0;

/// Whole-cell bounds; `end` is exclusive and greater than `start` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridBounds {
    pub start: GridPoint,
    pub end: GridPoint,
}

impl GridBounds {
    pub fn new(start: GridPoint, end: GridPoint) -> Self {
        debug_assert!(
            end.x > start.x && end.y > start.y && end.z > start.z,
            "grid bounds must not be empty"
        );
        Self { start, end }
    }

    /// Grows the bounds by `amount` cells on every side.
    pub fn pad(&self, amount: i32) -> Self {
        let padding = nalgebra::Vector3::repeat(amount);
        Self {
            start: self.start - padding,
            end: self.end + padding,
        }
    }

    /// Number of cells along each axis.
    pub fn dimensions(&self) -> [usize; 3] {
        let d = self.end - self.start;
        [d.x.max(0) as usize, d.y.max(0) as usize, d.z.max(0) as usize]
    }

    pub fn cell_count(&self) -> usize {
        self.dimensions().iter().product()
    }

    /// Fails with [`SurfacingError::Unbounded`] when any axis exceeds [`MAX_BOUNDS_CELLS`].
    pub fn check_size(&self) -> Result<()> {
        let too_large = (0..3).any(|axis| {
            let extent = self.end[axis] as i64 - self.start[axis] as i64;
            extent <= 0 || extent > MAX_BOUNDS_CELLS
        });
        if too_large {
            return Err(SurfacingError::unbounded(self.start, self.end));
        }
        Ok(())
    }

    /// Grid points along each axis when every cell is sampled `per_unit` times per axis.
    ///
    /// Fails with [`SurfacingError::Unbounded`] when the total overflows or
    /// exceeds [`MAX_GRID_POINTS`].
    pub fn sample_dimensions(&self, per_unit: u32) -> Result<[usize; 3]> {
        let scaled = self.dimensions().map(|d| d.checked_mul(per_unit as usize));
        let total = scaled
            .iter()
            .try_fold(1usize, |acc, d| d.and_then(|d| acc.checked_mul(d)));
        match (scaled, total) {
            ([Some(x), Some(y), Some(z)], Some(total)) if total <= MAX_GRID_POINTS => Ok([x, y, z]),
            _ => {
                let dimensions = scaled.map(|d| d.and_then(|d| i64::try_from(d).ok()).unwrap_or(i64::MAX));
                warn!(?dimensions, "sampling grid is too large");
                Err(SurfacingError::Unbounded { dimensions })
            }
        }
    }

    /// World-space bounds for cells of `cell_size`.
    pub fn to_decimal(&self, cell_size: Value) -> DecimalBounds {
        DecimalBounds {
            start: Point::from(self.start.coords.cast::<Value>() * cell_size),
            end: Point::from(self.end.coords.cast::<Value>() * cell_size),
        }
    }
}

/// World-space axis-aligned bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecimalBounds {
    pub start: Point,
    pub end: Point,
}

impl DecimalBounds {
    pub fn dimensions(&self) -> Vector {
        self.end - self.start
    }

    pub fn center(&self) -> Point {
        nalgebra::center(&self.start, &self.end)
    }

    pub fn contains(&self, p: &Point) -> bool {
        (0..3).all(|axis| p[axis] >= self.start[axis] && p[axis] < self.end[axis])
    }
}

/// Estimates the world-space box enclosing the field's surface.
///
/// Returns non-finite or inverted bounds for fields without a bounded zero
/// crossing; [`resolve_bounds`] turns those into errors.
pub fn field_decimal_bounds(field: &DistanceField) -> DecimalBounds {
    let extent = |facing: Value| {
        Vector::from_fn(|axis, _| {
            let probe = Point::from(Vector::ith(axis, facing * PROBE_DISTANCE));
            (PROBE_DISTANCE - field.distance(probe)) * facing
        })
    };

    DecimalBounds {
        start: Point::from(extent(-1.0)),
        end: Point::from(extent(1.0)),
    }
}

/// Resolves the whole-cell bounds of the field's surface, padded by `padding` cells.
///
/// Fails with [`SurfacingError::Unbounded`] instead of returning a grid that
/// is empty, non-finite, or larger than [`MAX_BOUNDS_CELLS`] on any axis.
pub fn resolve_bounds(field: &DistanceField, cell_size: Value, padding: i32) -> Result<GridBounds> {
    assert!(cell_size > 0.0, "cell size must be positive");
    let decimal = field_decimal_bounds(field);
    let finite = decimal.start.iter().chain(decimal.end.iter()).all(|v| v.is_finite());
    if !finite {
        warn!("distance field produced non-finite bounds");
        return Err(SurfacingError::Unbounded {
            dimensions: [i64::MAX; 3],
        });
    }

    let limit = (MAX_BOUNDS_CELLS * 4) as Value;
    let to_cells = |v: Value, round: fn(Value) -> Value| round(v / cell_size).clamp(-limit, limit) as i32;
    let start = decimal.start.map(|v| to_cells(v, Value::floor));
    let end = decimal.end.map(|v| to_cells(v, Value::ceil));

    let raw = GridBounds { start, end };
    let bounds = raw.pad(padding);
    if let Err(err) = raw.check_size().and(bounds.check_size()) {
        warn!(?raw, "{err}");
        return Err(err);
    }

    debug!(?bounds, "resolved grid bounds");
    Ok(bounds)
}
