use crate::{
    field::DistanceField,
    types::{Point, SurfaceId, Value, Vector},
};

/// Finite-difference step, in field units.
pub const NORMAL_EPSILON: Value = 1e-3;

/// Gradients shorter than this have no reliable direction.
const MIN_GRADIENT: Value = 1e-8;

/// Snapping stops once the field is this close to zero.
pub const SNAP_TOLERANCE: Value = 1e-4;

const MAX_SNAP_STEPS: usize = 5;

/// Estimates the outward surface normal at `p` by central differences.
///
/// Returns `None` when the gradient vanishes (flat interior, singularities),
/// so callers can substitute their own fallback instead of dividing by zero.
pub fn estimate_normal(field: &DistanceField, p: Point) -> Option<Vector> {
    let axis = |offset: Vector| field.distance(p + offset) - field.distance(p - offset);
    let gradient = Vector::new(
        axis(Vector::x() * NORMAL_EPSILON),
        axis(Vector::y() * NORMAL_EPSILON),
        axis(Vector::z() * NORMAL_EPSILON),
    );

    let length = gradient.norm();
    if length.is_finite() && length > MIN_GRADIENT {
        Some(gradient / length)
    } else {
        None
    }
}

/// Like [`estimate_normal`], substituting `fallback` for a degenerate gradient.
#[inline]
pub fn normal_or(field: &DistanceField, p: Point, fallback: Vector) -> Vector {
    estimate_normal(field, p).unwrap_or(fallback)
}

/// A point moved onto the zero crossing of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSnap {
    pub id: SurfaceId,
    pub location: Point,
    pub normal: Option<Vector>,
}

/// Moves `p` along the field normal until it sits on the surface.
///
/// The normal is estimated once at `p`; at most five Newton-style steps of
/// `p -= normal * distance` are taken. Without a usable normal `p` is returned
/// unchanged.
pub fn snap_to_surface(field: &DistanceField, p: Point) -> Point {
    snap_to_surface_with_normal(field, p).location
}

pub fn snap_to_surface_with_normal(field: &DistanceField, p: Point) -> SurfaceSnap {
    let mut sample = field.evaluate(p);
    let normal = estimate_normal(field, p);
    let Some(direction) = normal else {
        return SurfaceSnap {
            id: sample.id,
            location: p,
            normal,
        };
    };

    let mut location = p;
    for _ in 0..MAX_SNAP_STEPS {
        if sample.distance.abs() <= SNAP_TOLERANCE {
            break;
        }
        location -= direction * sample.distance;
        sample = field.evaluate(location);
    }

    SurfaceSnap {
        id: sample.id,
        location,
        normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{cube, sphere, union};
    use approx::assert_abs_diff_eq;

    #[test]
    fn sphere_normals_follow_the_radius() {
        let field = sphere(2.0);
        let directions = [
            Vector::new(1.0, 0.0, 0.0),
            Vector::new(0.0, -1.0, 0.0),
            Vector::new(1.0, 1.0, 1.0).normalize(),
            Vector::new(-0.3, 0.8, -0.52).normalize(),
        ];
        for direction in directions {
            let surface = Point::from(direction * 2.0);
            let normal = estimate_normal(&field, surface).unwrap();
            assert!(normal.dot(&direction) >= 0.99, "{normal:?} vs {direction:?}");
            assert_abs_diff_eq!(normal.norm(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn flat_fields_have_no_normal() {
        let field = crate::field::custom(|_| crate::types::DistanceSample::anonymous(-1.0));
        assert_eq!(estimate_normal(&field, Point::origin()), None);
        let up = Vector::z();
        assert_eq!(normal_or(&field, Point::origin(), up), up);
    }

    #[test]
    fn snapping_lands_on_the_surface() {
        let field = sphere(1.5);
        let snapped = snap_to_surface(&field, Point::new(2.5, 0.5, 0.0));
        assert_abs_diff_eq!(field.distance(snapped), 0.0, epsilon = SNAP_TOLERANCE);

        let boxed = cube(Vector::new(2.0, 2.0, 2.0));
        let snap = snap_to_surface_with_normal(&boxed, Point::new(0.0, 0.0, 1.4));
        assert_abs_diff_eq!(snap.location.z, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(snap.normal.unwrap().z, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn snapping_reports_the_nearest_surface_id() {
        let field = union([
            sphere(1.0).tagged(7),
            sphere(1.0).tagged(9).translate(Vector::new(4.0, 0.0, 0.0)),
        ]);
        let snap = snap_to_surface_with_normal(&field, Point::new(4.0, 1.3, 0.0));
        assert_eq!(snap.id, 9);
    }
}
