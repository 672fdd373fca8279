//! Composable signed distance fields.
//!
//! A [`DistanceField`] is a small tree of primitives, CSG combinators and
//! rigid transforms. Evaluation is pure: any [`Point`] is a valid input and
//! the result is a [`DistanceSample`] carrying the owning [`SurfaceId`].
//!
//! ```text
//! union(a, b)      -> min by distance, first operand wins ties
//! subtract(a, b)   -> max(a, -b), b's id only when the cut wins
//! intersect(a, b)  -> max by distance, first operand wins ties
//! translate/rotate -> inverse transform applied to the query point
//! ```

use std::{fmt, sync::Arc};

use nalgebra::UnitQuaternion;

use crate::{
    normal::snap_to_surface,
    types::{CompiledFunction, DistanceSample, Point, SurfaceId, Value, Vector},
};

/// Distance reported by an empty union; an empty intersection reports its negation.
///
/// Finite so that scaling and subtraction never produce NaN, and far beyond
/// any probe distance so an empty combinator still resolves as unbounded.
pub const EMPTY_DISTANCE: Value = 1.0e6;

/// A caller-supplied distance function.
pub type CustomField = dyn Fn(Point) -> DistanceSample + Send + Sync;

#[derive(Clone)]
pub enum DistanceField {
    Sphere {
        radius: Value,
    },
    /// Axis-aligned box centered on the origin.
    Cube {
        half_extents: Vector,
    },
    /// Capsule along the Z axis.
    Capsule {
        radius: Value,
        half_length: Value,
    },
    /// Capped cylinder along the Z axis.
    Cylinder {
        radius: Value,
        half_height: Value,
    },
    Union(Vec<DistanceField>),
    Subtract(Box<DistanceField>, Box<DistanceField>),
    Intersect(Vec<DistanceField>),
    Translate {
        offset: Vector,
        field: Box<DistanceField>,
    },
    Rotate {
        rotation: UnitQuaternion<Value>,
        field: Box<DistanceField>,
    },
    /// Distance multiplied by a constant.
    Multiply {
        constant: Value,
        field: Box<DistanceField>,
    },
    /// Adds `amplitude * deformer(p')` where `p'` is the query snapped onto `field`.
    ///
    /// Only approximately a distance near the surface.
    Deform {
        field: Box<DistanceField>,
        deformer: Arc<CompiledFunction>,
        amplitude: Value,
    },
    Tagged {
        id: SurfaceId,
        field: Box<DistanceField>,
    },
    Custom(Arc<CustomField>),
}

impl fmt::Debug for DistanceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sphere { radius } => f.debug_struct("Sphere").field("radius", radius).finish(),
            Self::Cube { half_extents } => f
                .debug_struct("Cube")
                .field("half_extents", half_extents)
                .finish(),
            Self::Capsule {
                radius,
                half_length,
            } => f
                .debug_struct("Capsule")
                .field("radius", radius)
                .field("half_length", half_length)
                .finish(),
            Self::Cylinder {
                radius,
                half_height,
            } => f
                .debug_struct("Cylinder")
                .field("radius", radius)
                .field("half_height", half_height)
                .finish(),
            Self::Union(fields) => f.debug_tuple("Union").field(fields).finish(),
            Self::Subtract(a, b) => f.debug_tuple("Subtract").field(a).field(b).finish(),
            Self::Intersect(fields) => f.debug_tuple("Intersect").field(fields).finish(),
            Self::Translate { offset, field } => f
                .debug_struct("Translate")
                .field("offset", offset)
                .field("field", field)
                .finish(),
            Self::Rotate { rotation, field } => f
                .debug_struct("Rotate")
                .field("rotation", rotation)
                .field("field", field)
                .finish(),
            Self::Multiply { constant, field } => f
                .debug_struct("Multiply")
                .field("constant", constant)
                .field("field", field)
                .finish(),
            Self::Deform {
                field, amplitude, ..
            } => f
                .debug_struct("Deform")
                .field("field", field)
                .field("amplitude", amplitude)
                .finish_non_exhaustive(),
            Self::Tagged { id, field } => f
                .debug_struct("Tagged")
                .field("id", id)
                .field("field", field)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Sphere of `radius` centered on the origin.
pub fn sphere(radius: Value) -> DistanceField {
    DistanceField::Sphere { radius }
}

/// Box with full edge lengths `dimensions`, centered on the origin.
pub fn cube(dimensions: Vector) -> DistanceField {
    DistanceField::Cube {
        half_extents: dimensions / 2.0,
    }
}

/// Capsule along Z; `height` includes both caps.
pub fn capsule(radius: Value, height: Value) -> DistanceField {
    DistanceField::Capsule {
        radius,
        half_length: (height / 2.0 - radius).max(0.0),
    }
}

/// Capped cylinder along Z.
pub fn cylinder(radius: Value, height: Value) -> DistanceField {
    DistanceField::Cylinder {
        radius,
        half_height: height / 2.0,
    }
}

/// Union of any number of fields. An empty union is empty space everywhere,
/// at [`EMPTY_DISTANCE`].
pub fn union(fields: impl IntoIterator<Item = DistanceField>) -> DistanceField {
    DistanceField::Union(fields.into_iter().collect())
}

/// Intersection of any number of fields. An empty intersection fills all space,
/// at `-EMPTY_DISTANCE`.
pub fn intersect(fields: impl IntoIterator<Item = DistanceField>) -> DistanceField {
    DistanceField::Intersect(fields.into_iter().collect())
}

pub fn subtract(first: DistanceField, second: DistanceField) -> DistanceField {
    DistanceField::Subtract(Box::new(first), Box::new(second))
}

pub fn custom<F>(function: F) -> DistanceField
where
    F: Fn(Point) -> DistanceSample + Send + Sync + 'static,
{
    DistanceField::Custom(Arc::new(function))
}

impl DistanceField {
    /// Evaluates the field at `p`.
    pub fn evaluate(&self, p: Point) -> DistanceSample {
        match self {
            Self::Sphere { radius } => DistanceSample::anonymous(p.coords.norm() - radius),
            Self::Cube { half_extents } => DistanceSample::anonymous(box_distance(p, half_extents)),
            Self::Capsule {
                radius,
                half_length,
            } => {
                let z = p.z.clamp(-half_length, *half_length);
                let offset = p.coords - Vector::new(0.0, 0.0, z);
                DistanceSample::anonymous(offset.norm() - radius)
            }
            Self::Cylinder {
                radius,
                half_height,
            } => {
                let radial = p.xy().coords.norm() - radius;
                let axial = p.z.abs() - half_height;
                let outside = radial.max(0.0).hypot(axial.max(0.0));
                let inside = radial.max(axial).min(0.0);
                DistanceSample::anonymous(outside + inside)
            }
            Self::Union(fields) => fold_samples(fields, p, EMPTY_DISTANCE, |next, best| {
                next.distance < best.distance
            }),
            Self::Intersect(fields) => {
                fold_samples(fields, p, -EMPTY_DISTANCE, |next, best| {
                    next.distance > best.distance
                })
            }
            Self::Subtract(first, second) => {
                let kept = first.evaluate(p);
                let cut = second.evaluate(p);
                if -cut.distance > kept.distance {
                    DistanceSample::new(cut.id, -cut.distance)
                } else {
                    kept
                }
            }
            Self::Translate { offset, field } => field.evaluate(p - offset),
            Self::Rotate { rotation, field } => field.evaluate(rotation.inverse_transform_point(&p)),
            Self::Multiply { constant, field } => {
                let sample = field.evaluate(p);
                DistanceSample::new(sample.id, sample.distance * constant)
            }
            Self::Deform {
                field,
                deformer,
                amplitude,
            } => {
                let sample = field.evaluate(p);
                let location = snap_to_surface(field, p);
                DistanceSample::new(sample.id, sample.distance + amplitude * deformer(location))
            }
            Self::Tagged { id, field } => DistanceSample::new(*id, field.evaluate(p).distance),
            Self::Custom(function) => function(p),
        }
    }

    /// Shorthand for `self.evaluate(p).distance`.
    #[inline]
    pub fn distance(&self, p: Point) -> Value {
        self.evaluate(p).distance
    }

    pub fn translate(self, offset: Vector) -> Self {
        Self::Translate {
            offset,
            field: Box::new(self),
        }
    }

    pub fn rotate(self, rotation: UnitQuaternion<Value>) -> Self {
        Self::Rotate {
            rotation,
            field: Box::new(self),
        }
    }

    pub fn scale(self, constant: Value) -> Self {
        Self::Multiply {
            constant,
            field: Box::new(self),
        }
    }

    pub fn deform(self, deformer: Arc<CompiledFunction>, amplitude: Value) -> Self {
        Self::Deform {
            field: Box::new(self),
            deformer,
            amplitude,
        }
    }

    pub fn tagged(self, id: SurfaceId) -> Self {
        Self::Tagged {
            id,
            field: Box::new(self),
        }
    }

    pub fn union(self, other: DistanceField) -> Self {
        match self {
            Self::Union(mut fields) => {
                fields.push(other);
                Self::Union(fields)
            }
            field => Self::Union(vec![field, other]),
        }
    }

    pub fn intersect(self, other: DistanceField) -> Self {
        match self {
            Self::Intersect(mut fields) => {
                fields.push(other);
                Self::Intersect(fields)
            }
            field => Self::Intersect(vec![field, other]),
        }
    }

    pub fn subtract(self, other: DistanceField) -> Self {
        subtract(self, other)
    }
}

/// Pairwise fold; `replaces(next, best)` must be strict so earlier operands keep ties.
fn fold_samples<F>(fields: &[DistanceField], p: Point, empty: Value, replaces: F) -> DistanceSample
where
    F: Fn(&DistanceSample, &DistanceSample) -> bool,
{
    let mut samples = fields.iter().map(|field| field.evaluate(p));
    let Some(first) = samples.next() else {
        return DistanceSample::anonymous(empty);
    };
    samples.fold(first, |best, next| if replaces(&next, &best) { next } else { best })
}

#[inline]
fn box_distance(p: Point, half_extents: &Vector) -> Value {
    let q = p.coords.abs() - half_extents;
    let outside = q.map(|v| v.max(0.0)).norm();
    let inside = q.x.max(q.y.max(q.z)).min(0.0);
    outside + inside
}
