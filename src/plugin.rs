use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
    tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future},
};

use crate::{
    collision::CollisionShape,
    error::Result,
    shading::SdfModel,
    surfacing::{Geometry, SurfacedModel, Surfacing, surface_model},
};

/// System sets for the surfacing pipeline.
///
/// Use these to order your own systems relative to geometry generation:
///
/// ```rust,ignore
/// // Run after geometry is ready but before it's uploaded, e.g. to register colliders:
/// app.add_systems(Update, register_collider.after(SurfacingSet::Generate)
///                                          .before(SurfacingSet::Upload));
/// ```
///
/// ```text
/// SurfacingSet::Spawn  ->  [async compute]  ->  SurfacingSet::Generate  ->  [your systems]  ->  SurfacingSet::Upload
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfacingSet {
    /// Queues new or changed shapes and spawns an async task for each.
    Spawn,
    /// Polls async tasks and inserts [`GeneratedGeometry`] on completion.
    Generate,
    /// Uploads [`GeneratedGeometry`] into a [`Mesh3d`] and removes it.
    Upload,
}

/// A distance-field model to be surfaced on this entity.
///
/// Geometry is regenerated whenever the component is added or changed.
#[derive(Component, Clone, Debug)]
#[require(Transform)]
pub struct SdfShape {
    pub model: SdfModel,
    pub surfacing: Surfacing,
}

impl SdfShape {
    pub fn new(model: SdfModel) -> Self {
        Self {
            model,
            surfacing: Surfacing::default(),
        }
    }

    pub fn with_surfacing(mut self, surfacing: Surfacing) -> Self {
        self.surfacing = surfacing;
        self
    }
}

/// Marker for [`SdfShape`] entities waiting for geometry.
#[derive(Component)]
pub struct QueuedShape;

/// Holds the in-flight async surfacing task for an [`SdfShape`].
#[derive(Component)]
pub struct ComputeTask(Task<Result<SurfacedModel>>);

/// Finished geometry, present between [`SurfacingSet::Generate`] and [`SurfacingSet::Upload`].
///
/// `None` when surfacing failed; the entity then receives an empty mesh.
#[derive(Component, Debug)]
pub struct GeneratedGeometry(pub Option<Geometry>);

/// Collision shape of a surfaced model, for the physics side to register.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct SdfCollider(pub CollisionShape);

/// Runtime configuration for the surfacing pipeline.
///
/// Inserted as a resource by [`SdfSurfacingPlugin`] and may be changed at any time.
#[derive(Resource)]
pub struct SurfacingConfig {
    /// Maximum number of async surfacing tasks spawned per frame. Default: `4`.
    pub max_tasks_per_frame: usize,
}

impl Default for SurfacingConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: 4,
        }
    }
}

/// Bevy plugin that surfaces [`SdfShape`]s on the `AsyncComputeTaskPool`.
///
/// ```text
/// SdfShape added or changed
///   -> QueuedShape inserted            (SurfacingSet::Spawn)
///   -> ComputeTask spawned             (SurfacingSet::Spawn)
///   -> [async compute runs]
///   -> GeneratedGeometry + SdfCollider (SurfacingSet::Generate, once the task completes)
///   -> [your systems here]
///   -> Mesh3d inserted                 (SurfacingSet::Upload)
///   -> QueuedShape + GeneratedGeometry removed
/// ```
///
/// A shape that fails to surface gets an empty mesh and a warning; other
/// shapes are unaffected.
pub struct SdfSurfacingPlugin {
    /// Initial value for [`SurfacingConfig::max_tasks_per_frame`].
    pub max_tasks_per_frame: usize,
}

impl Default for SdfSurfacingPlugin {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: SurfacingConfig::default().max_tasks_per_frame,
        }
    }
}

impl Plugin for SdfSurfacingPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SurfacingConfig {
            max_tasks_per_frame: self.max_tasks_per_frame,
        });

        #[cfg(feature = "auto_queue")]
        app.configure_sets(
            Update,
            (SurfacingSet::Spawn, SurfacingSet::Generate, SurfacingSet::Upload).chain(),
        )
        .add_systems(
            Update,
            (
                (queue_changed_shapes, spawn_surfacing_tasks)
                    .chain()
                    .in_set(SurfacingSet::Spawn),
                poll_surfacing_tasks.in_set(SurfacingSet::Generate),
                upload_geometry.in_set(SurfacingSet::Upload),
            ),
        );
    }
}

/// Queues every added or changed [`SdfShape`], dropping any stale task.
fn queue_changed_shapes(mut commands: Commands, query: Query<Entity, Changed<SdfShape>>) {
    for entity in query.iter() {
        commands
            .entity(entity)
            .insert(QueuedShape)
            .remove::<(ComputeTask, GeneratedGeometry)>();
    }
}

/// Spawns async surfacing tasks for [`QueuedShape`]s, up to [`SurfacingConfig::max_tasks_per_frame`] per frame.
fn spawn_surfacing_tasks(
    mut commands: Commands,
    config: Res<SurfacingConfig>,
    query: Query<(Entity, &SdfShape), (With<QueuedShape>, Without<ComputeTask>, Without<GeneratedGeometry>)>,
) {
    let task_pool = AsyncComputeTaskPool::get();

    for (entity, shape) in query.iter().take(config.max_tasks_per_frame) {
        // Cloning the model only bumps reference counts on its shared closures.
        let model = shape.model.clone();
        let surfacing = shape.surfacing;
        let task = task_pool.spawn(async move { surface_model(&model, &surfacing) });
        commands.entity(entity).insert(ComputeTask(task));
    }
}

/// Polls in-flight [`ComputeTask`]s and inserts [`GeneratedGeometry`] on completion.
///
/// Non-blocking: unfinished tasks are retried next frame.
fn poll_surfacing_tasks(mut commands: Commands, mut query: Query<(Entity, &mut ComputeTask)>) {
    for (entity, mut compute_task) in query.iter_mut() {
        let Some(result) = block_on(future::poll_once(&mut compute_task.0)) else {
            continue;
        };

        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<ComputeTask>();
        match result {
            Ok(surfaced) => {
                match surfaced.collision {
                    Some(shape) => entity_commands.insert(SdfCollider(shape)),
                    None => entity_commands.remove::<SdfCollider>(),
                };
                entity_commands.insert(GeneratedGeometry(Some(surfaced.geometry)));
            }
            Err(err) => {
                warn!(?entity, "could not surface shape: {err}");
                entity_commands
                    .remove::<SdfCollider>()
                    .insert(GeneratedGeometry(None));
            }
        }
    }
}

/// Uploads [`GeneratedGeometry`] into a [`Mesh3d`], then removes it and [`QueuedShape`].
fn upload_geometry(
    mut commands: Commands,
    query: Query<(Entity, &GeneratedGeometry), With<QueuedShape>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    for (entity, generated) in query.iter() {
        let mesh = match &generated.0 {
            Some(geometry) => to_bevy_mesh(geometry),
            None => empty_mesh(),
        };

        commands
            .entity(entity)
            .insert(Mesh3d(meshes.add(mesh)))
            .remove::<(QueuedShape, GeneratedGeometry)>();
    }
}

/// Converts surfaced geometry into a render mesh with position, normal and color attributes.
///
/// Meshes become indexed triangle lists, point clouds become point lists in
/// their partitioned order.
pub fn to_bevy_mesh(geometry: &Geometry) -> Mesh {
    match geometry {
        Geometry::Mesh(sdf_mesh) => {
            let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::RENDER_WORLD);
            mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, sdf_mesh.positions());
            mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, sdf_mesh.normals());
            mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, sdf_mesh.colors());
            mesh.insert_indices(Indices::U32(sdf_mesh.flat_indices()));
            mesh
        }
        Geometry::Points(cloud) => {
            let mut mesh = Mesh::new(PrimitiveTopology::PointList, RenderAssetUsages::RENDER_WORLD);
            let points = &cloud.points;
            let positions: Vec<[f32; 3]> = points.iter().map(|p| p.location.coords.into()).collect();
            let normals: Vec<[f32; 3]> = points.iter().map(|p| p.normal.into()).collect();
            let colors: Vec<[f32; 4]> = points.iter().map(|p| p.shading.rgba()).collect();
            mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
            mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
            mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
            mesh
        }
    }
}

fn empty_mesh() -> Mesh {
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::RENDER_WORLD);
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, Vec::<[f32; 3]>::new());
    mesh.insert_indices(Indices::U32(Vec::new()));
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{custom, sphere},
        mesh::SdfMesh,
        points::{SamplingConfig, partition_samples},
        shading::{Shading, constant_shading},
        types::{DistanceSample, Value},
    };

    fn ball() -> SdfModel {
        SdfModel::new(sphere(1.5), constant_shading(Shading::default()))
    }

    #[test]
    fn triangle_meshes_are_indexed() {
        let surfaced = surface_model(&ball(), &Surfacing::mesh(2)).unwrap();
        let Geometry::Mesh(ref sdf_mesh) = surfaced.geometry else {
            panic!("expected a mesh");
        };
        let mesh = to_bevy_mesh(&surfaced.geometry);
        assert_eq!(mesh.primitive_topology(), PrimitiveTopology::TriangleList);
        assert_eq!(mesh.count_vertices(), sdf_mesh.vertices.len());
        assert_eq!(mesh.indices().map(Indices::len), Some(sdf_mesh.triangles.len() * 3));
        assert!(mesh.attribute(Mesh::ATTRIBUTE_COLOR).is_some());
    }

    #[test]
    fn point_clouds_are_point_lists() {
        let surfaced = surface_model(&ball(), &Surfacing::points(SamplingConfig::default())).unwrap();
        let mesh = to_bevy_mesh(&surfaced.geometry);
        assert_eq!(mesh.primitive_topology(), PrimitiveTopology::PointList);
        assert!(mesh.indices().is_none());

        let empty = to_bevy_mesh(&Geometry::Points(partition_samples(1, Vec::new())));
        assert_eq!(empty.count_vertices(), 0);
        assert_eq!(to_bevy_mesh(&Geometry::Mesh(SdfMesh::default())).count_vertices(), 0);
    }

    #[test]
    fn failed_shapes_get_an_empty_mesh() {
        let mesh = empty_mesh();
        assert_eq!(mesh.count_vertices(), 0);
        assert_eq!(mesh.indices().map(Indices::len), Some(0));
    }

    #[cfg(feature = "auto_queue")]
    #[test]
    fn a_failing_shape_does_not_hold_back_the_others() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default(), SdfSurfacingPlugin::default()))
            .init_asset::<Mesh>();

        let white = constant_shading(Shading::default());
        let broken = SdfModel::new(custom(|_| DistanceSample::anonymous(Value::NAN)), white.clone())
            .with_collision(CollisionShape::FieldBounds);
        let fine = SdfModel::new(sphere(1.0), white).with_collision(CollisionShape::FieldBounds);
        let broken = app.world_mut().spawn(SdfShape::new(broken)).id();
        let fine = app.world_mut().spawn(SdfShape::new(fine)).id();

        let mut frames = 0;
        while [broken, fine].iter().any(|&e| app.world().get::<Mesh3d>(e).is_none()) {
            assert!(frames < 2000, "surfacing did not finish");
            app.update();
            std::thread::sleep(std::time::Duration::from_millis(5));
            frames += 1;
        }

        let world = app.world();
        let meshes = world.resource::<Assets<Mesh>>();
        let vertices = |entity: Entity| {
            let handle = &world.get::<Mesh3d>(entity).unwrap().0;
            meshes.get(handle).unwrap().count_vertices()
        };
        assert_eq!(vertices(broken), 0);
        assert!(vertices(fine) > 0);

        assert!(world.get::<SdfCollider>(broken).is_none());
        assert!(world.get::<SdfCollider>(fine).is_some());
        for entity in [broken, fine] {
            assert!(world.get::<QueuedShape>(entity).is_none());
            assert!(world.get::<GeneratedGeometry>(entity).is_none());
        }
    }
}
