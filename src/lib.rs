pub mod bounds;
pub mod collision;
pub mod error;
pub mod field;
pub mod interp;
pub mod marching;
pub mod mesh;
pub mod normal;
pub mod plugin;
pub mod points;
pub mod shading;
pub mod surfacing;
pub mod tables;
pub mod types;
pub mod voxel;

pub use error::{Result, SurfacingError};
pub use field::DistanceField;
pub use mesh::{SamplePoint, SdfMesh, marching_mesh};
pub use plugin::{SdfCollider, SdfShape, SdfSurfacingPlugin, SurfacingSet};
pub use points::{PointCloud, SamplingConfig};
pub use shading::{SdfModel, Shading, merge_models};
pub use surfacing::Surfacing;
