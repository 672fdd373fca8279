use std::sync::Arc;

use bevy::prelude::*;
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};
use bevy_sdf_surfacing::{
    SamplingConfig, SdfCollider, SdfModel, SdfShape, SdfSurfacingPlugin, Shading, Surfacing, merge_models,
    collision::CollisionShape,
    field::{capsule, cube, cylinder, sphere},
    shading::constant_shading,
    types::{Point, Vector},
};

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            SdfSurfacingPlugin::default(),
            PanOrbitCameraPlugin,
            #[cfg(not(target_arch = "wasm32"))]
            bevy::pbr::wireframe::WireframePlugin::default(),
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, report_colliders)
        .run();
}

fn setup(mut commands: Commands, mut materials: ResMut<Assets<StandardMaterial>>) {
    bevy::log::info!("CSG Example");

    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
        Transform::from_xyz(6.0, 5.0, 8.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: light_consts::lux::OVERCAST_DAY,
            ..Default::default()
        },
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));

    // Vertex colors carry the shading; the material only needs to be white.
    let material = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        perceptual_roughness: 0.6,
        ..default()
    });

    // A drilled block with a rippled sphere on top.
    let block = cube(Vector::new(3.0, 1.0, 3.0))
        .subtract(cylinder(0.6, 2.0).rotate(nalgebra::UnitQuaternion::from_axis_angle(
            &Vector::x_axis(),
            std::f32::consts::FRAC_PI_2,
        )))
        .subtract(sphere(0.4).translate(Vector::new(1.5, 0.5, 1.5)));
    let ripple = Arc::new(|p: Point| (p.x * 8.0).sin() * (p.z * 8.0).sin());
    let dome = sphere(1.0)
        .deform(ripple, 0.05)
        .translate(Vector::new(0.0, 1.2, 0.0));

    let stone = Shading::new(Vector::new(0.55, 0.5, 0.45));
    let copper = Shading {
        specular: 0.95,
        ..Shading::new(Vector::new(0.85, 0.45, 0.25))
    };
    let model = merge_models(vec![
        SdfModel::new(block, constant_shading(stone)).with_collision(CollisionShape::FieldBounds),
        SdfModel::new(dome, constant_shading(copper)).with_collision(CollisionShape::FieldBounds),
    ]);

    commands.spawn((
        SdfShape::new(model).with_surfacing(Surfacing::mesh(8)),
        MeshMaterial3d(material.clone()),
        Transform::from_xyz(-2.5, 0.0, 0.0),
    ));

    // The same pill surfaced both ways, side by side.
    let pill = SdfModel::new(
        capsule(0.6, 2.4).rotate(nalgebra::UnitQuaternion::from_axis_angle(
            &Vector::x_axis(),
            std::f32::consts::FRAC_PI_2,
        )),
        Arc::new(|p: Point| Shading::new(Vector::new(0.3, 0.5 + p.y * 0.2, 0.9))),
    );
    commands.spawn((
        SdfShape::new(pill.clone()).with_surfacing(Surfacing::mesh(6)),
        MeshMaterial3d(material.clone()),
        Transform::from_xyz(1.5, 0.0, 0.0),
    ));
    commands.spawn((
        SdfShape::new(pill).with_surfacing(Surfacing::points(
            SamplingConfig::default()
                .with_levels(3)
                .with_level_offset_range(0.02),
        )),
        MeshMaterial3d(material),
        Transform::from_xyz(3.5, 0.0, 0.0),
    ));
}

fn report_colliders(query: Query<(Entity, &SdfCollider), Added<SdfCollider>>) {
    for (entity, collider) in query.iter() {
        bevy::log::info!("{entity} collider: {:?}", collider.0);
    }
}
