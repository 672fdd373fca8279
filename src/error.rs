use derive_more::Display;

use crate::types::GridPoint;

pub type Result<T> = core::result::Result<T, SurfacingError>;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SurfacingError {
    /// The field's surface could not be enclosed by a small enough grid.
    ///
    /// Recoverable: the object simply produces no geometry.
    #[display("surface bounds are unresolvable (dimensions {dimensions:?})")]
    Unbounded { dimensions: [i64; 3] },
    #[display("voxels per unit must be positive, got {_0}")]
    InvalidVoxelsPerUnit(u32),
    #[display("sampling levels must be positive, got {_0}")]
    InvalidLevels(u32),
    #[display("sampling resolution must be positive, got {_0}")]
    InvalidResolution(u32),
}

impl SurfacingError {
    pub(crate) fn unbounded(start: GridPoint, end: GridPoint) -> Self {
        let dimensions = [
            end.x as i64 - start.x as i64,
            end.y as i64 - start.y as i64,
            end.z as i64 - start.z as i64,
        ];
        Self::Unbounded { dimensions }
    }

    /// Whether this failure only drops the current object.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unbounded { .. })
    }
}

impl std::error::Error for SurfacingError {}
