use std::{collections::HashSet, sync::Arc};

use approx::assert_abs_diff_eq;
use bevy_sdf_surfacing::{
    SdfModel, Shading, SurfacingError, merge_models,
    bounds::resolve_bounds,
    field::{DistanceField, custom, cube, sphere},
    marching::triangulate,
    mesh::{assemble, marching_mesh, marching_mesh_in},
    normal::estimate_normal,
    points::{NormalSide, SamplingConfig, point_cloud},
    shading::{ShadingFunction, constant_shading},
    surfacing::{Surfacing, surface_model},
    types::{DistanceSample, Point, Value, Vector},
    voxel::{ISO_LEVEL, voxelize},
};

fn white() -> Arc<ShadingFunction> {
    constant_shading(Shading::default())
}

fn carved() -> DistanceField {
    cube(Vector::new(3.0, 3.0, 3.0))
        .subtract(sphere(1.8))
        .union(sphere(0.8))
}

#[test]
fn mesh_pipeline_is_bit_identical_across_runs() {
    let field = carved();
    let bounds = resolve_bounds(&field, 1.0, 1).unwrap();
    let banded: Arc<ShadingFunction> =
        Arc::new(|p: Point| Shading::new(Vector::new(p.x.abs().fract(), p.y.abs().fract(), 0.5)));
    let first = marching_mesh_in(3, &field, &*banded, &bounds).unwrap();
    let second = marching_mesh_in(3, &field, &*banded, &bounds).unwrap();

    assert!(!first.is_empty());
    assert_eq!(first.triangles, second.triangles);
    assert_eq!(bits(&first.positions()), bits(&second.positions()));
    assert_eq!(bits(&first.normals()), bits(&second.normals()));
    assert_eq!(bits(&first.colors()), bits(&second.colors()));
}

fn bits<const N: usize>(values: &[[f32; N]]) -> Vec<[u32; N]> {
    values.iter().map(|v| v.map(f32::to_bits)).collect()
}

#[test]
fn assembled_vertices_match_distinct_edges() {
    let field = carved();
    let bounds = resolve_bounds(&field, 1.0, 1).unwrap();
    let grid = voxelize(&field, &bounds, 2);
    let triangles = triangulate(grid.as_slice(), grid.dimensions(), ISO_LEVEL);
    let distinct: HashSet<_> = triangles.iter().flatten().map(|c| c.edge).collect();

    let mesh = assemble(&triangles, &field, &*white(), 2, grid.origin);
    assert_eq!(mesh.vertices.len(), distinct.len());
    assert_ne!(mesh.vertices.len(), triangles.len() * 3);
}

#[test]
fn triangles_index_three_distinct_vertices() {
    let mesh = marching_mesh(4, &sphere(1.5), &*white()).unwrap();
    for [a, b, c] in &mesh.triangles {
        assert!(a != b && b != c && a != c);
        assert!([a, b, c].iter().all(|&&i| (i as usize) < mesh.vertices.len()));
    }
}

#[test]
fn unbounded_fields_fail_without_allocating() {
    let solid = custom(|_| DistanceSample::anonymous(-1.0));
    let err = marching_mesh(4, &solid, &*white()).unwrap_err();
    assert!(matches!(err, SurfacingError::Unbounded { .. }));
    assert!(err.is_recoverable());

    let giant = sphere(400.0);
    assert!(point_cloud(&giant, &*white(), &SamplingConfig::default()).is_err());
}

#[test]
fn normals_point_away_from_the_center() {
    let field = sphere(2.0);
    for direction in [Vector::x(), -Vector::y(), Vector::new(1.0, 1.0, -1.0).normalize()] {
        let normal = estimate_normal(&field, Point::from(direction * 2.0)).unwrap();
        assert!(normal.dot(&direction) >= 0.99);
    }
    assert!(estimate_normal(&custom(|_| DistanceSample::anonymous(1.0)), Point::origin()).is_none());
}

#[test]
fn point_cloud_partitions_cover_every_point() {
    let config = SamplingConfig::default().with_levels(3).with_level_offset_range(0.1);
    let cloud = point_cloud(&sphere(1.2), &*white(), &config).unwrap();

    let detail: usize = cloud.partitions.iter().flatten().sum();
    assert_eq!(cloud.base_count + detail, cloud.points.len());
    assert_eq!(cloud.partitions.len(), NormalSide::ALL.len());
    assert!(cloud.points[..cloud.base_count].iter().all(|p| p.level == 0));

    let offsets = cloud.volume_offsets();
    assert_eq!(offsets[1], cloud.base_count);
    for point in &cloud.points {
        let expected = 1.2 + config.level_offset(point.level);
        assert_abs_diff_eq!(point.location.coords.norm(), expected, epsilon = 1e-2);
    }
}

#[test]
fn merged_models_shade_by_owner() {
    let red = Shading::new(Vector::new(1.0, 0.0, 0.0));
    let green = Shading::new(Vector::new(0.0, 1.0, 0.0));
    let model = merge_models(vec![
        SdfModel::new(sphere(1.0).translate(Vector::new(-1.5, 0.0, 0.0)), constant_shading(red)),
        SdfModel::new(sphere(1.0).translate(Vector::new(1.5, 0.0, 0.0)), constant_shading(green)),
    ]);

    let surfaced = surface_model(&model, &Surfacing::mesh(4)).unwrap();
    let bevy_sdf_surfacing::surfacing::Geometry::Mesh(mesh) = surfaced.geometry else {
        panic!("expected a mesh");
    };
    for vertex in &mesh.vertices {
        let expected = if vertex.location.x < 0.0 { red } else { green };
        assert_eq!(vertex.shading, expected);
    }
}

#[test]
fn failures_are_isolated_per_model() {
    let broken = SdfModel::new(custom(|_| DistanceSample::anonymous(Value::NAN)), white());
    let fine = SdfModel::new(sphere(1.0), white());

    let results: Vec<_> = [broken, fine]
        .iter()
        .map(|model| surface_model(model, &Surfacing::default()))
        .collect();
    assert!(results[0].as_ref().is_err_and(SurfacingError::is_recoverable));
    assert!(results[1].is_ok());
}
