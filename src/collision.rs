use nalgebra::Isometry3;

use crate::{
    bounds::field_decimal_bounds,
    field::DistanceField,
    types::{Value, Vector},
};

/// Collision geometry handed to the physics side untouched.
///
/// [`FieldBounds`](CollisionShape::FieldBounds) is the only variant that
/// depends on the distance field; [`resolve`](CollisionShape::resolve) turns
/// it into a box.
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionShape {
    Box {
        half_extents: Vector,
    },
    /// Along Z; `height` includes both caps.
    Capsule {
        radius: Value,
        height: Value,
    },
    /// Along Z.
    Cylinder {
        radius: Value,
        height: Value,
    },
    Composite(Vec<CollisionShape>),
    Transformed {
        transform: Isometry3<Value>,
        shape: Box<CollisionShape>,
    },
    /// A box fitted to the surface of the model's own distance field.
    FieldBounds,
}

impl CollisionShape {
    /// Box with full edge lengths `dimensions`.
    pub fn cuboid(dimensions: Vector) -> Self {
        Self::Box {
            half_extents: dimensions / 2.0,
        }
    }

    pub fn transformed(self, transform: Isometry3<Value>) -> Self {
        Self::Transformed {
            transform,
            shape: Box::new(self),
        }
    }

    /// Replaces every [`FieldBounds`](CollisionShape::FieldBounds) with a box
    /// around `field`'s surface, centered where the surface is.
    pub fn resolve(&self, field: &DistanceField) -> Self {
        match self {
            Self::FieldBounds => {
                let bounds = field_decimal_bounds(field);
                let half_extents = bounds.dimensions().map(|v| v.max(0.0)) / 2.0;
                let center = bounds.center().coords;
                let shape = Self::Box { half_extents };
                if center == Vector::zeros() {
                    shape
                } else {
                    shape.transformed(Isometry3::translation(center.x, center.y, center.z))
                }
            }
            Self::Composite(shapes) => {
                Self::Composite(shapes.iter().map(|shape| shape.resolve(field)).collect())
            }
            Self::Transformed { transform, shape } => Self::Transformed {
                transform: *transform,
                shape: Box::new(shape.resolve(field)),
            },
            shape => shape.clone(),
        }
    }
}

/// Combines shapes into one, flattening nested composites.
///
/// Returns `None` for no shapes and the shape itself for exactly one.
pub fn merge_shapes(shapes: impl IntoIterator<Item = CollisionShape>) -> Option<CollisionShape> {
    let mut merged: Vec<CollisionShape> = Vec::new();
    for shape in shapes {
        match shape {
            CollisionShape::Composite(inner) => merged.extend(inner),
            shape => merged.push(shape),
        }
    }

    match merged.len() {
        0 => None,
        1 => merged.pop(),
        _ => Some(CollisionShape::Composite(merged)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{cube, sphere};
    use approx::assert_abs_diff_eq;

    #[test]
    fn field_bounds_become_a_box() {
        let shape = CollisionShape::FieldBounds.resolve(&sphere(1.5));
        let CollisionShape::Box { half_extents } = shape else {
            panic!("expected a box, got {shape:?}");
        };
        assert_abs_diff_eq!(half_extents, Vector::repeat(1.5), epsilon = 1e-2);
    }

    #[test]
    fn offset_field_bounds_are_translated() {
        let field = cube(Vector::new(2.0, 2.0, 2.0)).translate(Vector::new(5.0, 0.0, 0.0));
        let shape = CollisionShape::FieldBounds.resolve(&field);
        let CollisionShape::Transformed { transform, shape } = shape else {
            panic!("expected a transformed box");
        };
        assert_abs_diff_eq!(transform.translation.vector.x, 5.0, epsilon = 1e-2);
        assert!(matches!(*shape, CollisionShape::Box { .. }));
    }

    #[test]
    fn other_shapes_pass_through() {
        let capsule = CollisionShape::Capsule {
            radius: 0.5,
            height: 2.0,
        };
        assert_eq!(capsule.resolve(&sphere(1.0)), capsule);
    }

    #[test]
    fn merging_flattens_composites() {
        assert_eq!(merge_shapes([]), None);

        let a = CollisionShape::cuboid(Vector::new(1.0, 1.0, 1.0));
        assert_eq!(merge_shapes([a.clone()]), Some(a.clone()));

        let nested = CollisionShape::Composite(vec![a.clone(), CollisionShape::FieldBounds]);
        let Some(CollisionShape::Composite(shapes)) = merge_shapes([a, nested]) else {
            panic!("expected a composite");
        };
        assert_eq!(shapes.len(), 3);
    }
}
