use tracing::debug_span;

use crate::{
    collision::CollisionShape,
    error::{Result, SurfacingError},
    mesh::{SdfMesh, marching_mesh},
    points::{PointCloud, SamplingConfig, point_cloud},
    shading::SdfModel,
};

/// How a model is turned into geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Surfacing {
    /// Marching cubes at `voxels_per_unit` grid points per world unit.
    Mesh { voxels_per_unit: u32 },
    /// Adaptive point cloud.
    Points(SamplingConfig),
}

impl Default for Surfacing {
    fn default() -> Self {
        Self::Mesh { voxels_per_unit: 4 }
    }
}

impl Surfacing {
    pub fn mesh(voxels_per_unit: u32) -> Self {
        Self::Mesh { voxels_per_unit }
    }

    pub fn points(config: SamplingConfig) -> Self {
        Self::Points(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Mesh { voxels_per_unit: 0 } => Err(SurfacingError::InvalidVoxelsPerUnit(0)),
            Self::Mesh { .. } => Ok(()),
            Self::Points(config) => config.validate(),
        }
    }
}

/// Output of either surfacing path.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Mesh(SdfMesh),
    Points(PointCloud),
}

impl Geometry {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Mesh(mesh) => mesh.is_empty(),
            Self::Points(cloud) => cloud.points.is_empty(),
        }
    }
}

/// Geometry and collision for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacedModel {
    pub geometry: Geometry,
    pub collision: Option<CollisionShape>,
}

/// Runs the surfacing path selected by `surfacing` over `model`.
pub fn surface_model(model: &SdfModel, surfacing: &Surfacing) -> Result<SurfacedModel> {
    surfacing.validate()?;
    let _span = debug_span!("surface_model", ?surfacing).entered();

    let geometry = match surfacing {
        Surfacing::Mesh { voxels_per_unit } => {
            Geometry::Mesh(marching_mesh(*voxels_per_unit, &model.form, &*model.shading)?)
        }
        Surfacing::Points(config) => Geometry::Points(point_cloud(&model.form, &*model.shading, config)?),
    };

    Ok(SurfacedModel {
        geometry,
        collision: model.resolved_collision(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::sphere,
        shading::{Shading, constant_shading},
    };

    fn ball() -> SdfModel {
        SdfModel::new(sphere(1.5), constant_shading(Shading::default()))
            .with_collision(CollisionShape::FieldBounds)
    }

    #[test]
    fn both_paths_produce_geometry() {
        let mesh = surface_model(&ball(), &Surfacing::mesh(2)).unwrap();
        assert!(matches!(mesh.geometry, Geometry::Mesh(ref m) if !m.is_empty()));
        assert!(matches!(mesh.collision, Some(CollisionShape::Box { .. })));

        let points = surface_model(&ball(), &Surfacing::points(SamplingConfig::default())).unwrap();
        assert!(matches!(points.geometry, Geometry::Points(ref c) if c.base_count > 0));
    }

    #[test]
    fn invalid_surfacing_is_rejected() {
        assert_eq!(
            surface_model(&ball(), &Surfacing::mesh(0)),
            Err(SurfacingError::InvalidVoxelsPerUnit(0))
        );
        let points = Surfacing::points(SamplingConfig::default().with_levels(0));
        assert_eq!(points.validate(), Err(SurfacingError::InvalidLevels(0)));
    }
}
