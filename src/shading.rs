use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    collision::{CollisionShape, merge_shapes},
    field::DistanceField,
    types::{ANONYMOUS_SURFACE, Point, SurfaceId, Value, Vector},
};

/// Surface appearance at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shading {
    /// Linear RGB in `[0, 1]`.
    pub color: Vector,
    pub opacity: Value,
    pub specular: Value,
    pub glow: Value,
}

impl Shading {
    /// Opaque, slightly glossy, non-glowing shading of `color`.
    pub fn new(color: Vector) -> Self {
        Self {
            color,
            opacity: 1.0,
            specular: 0.8,
            glow: 0.0,
        }
    }

    /// `[r, g, b, opacity]`
    pub fn rgba(&self) -> [f32; 4] {
        [self.color.x, self.color.y, self.color.z, self.opacity]
    }
}

impl Default for Shading {
    fn default() -> Self {
        Self::new(Vector::repeat(1.0))
    }
}

/// Maps a world-space point to its [`Shading`].
pub type ShadingFunction = dyn Fn(Point) -> Shading + Send + Sync;

/// Shading that ignores its input.
pub fn constant_shading(shading: Shading) -> Arc<ShadingFunction> {
    Arc::new(move |_| shading)
}

/// Everything needed to surface one object.
#[derive(Clone)]
pub struct SdfModel {
    pub form: DistanceField,
    pub shading: Arc<ShadingFunction>,
    pub collision: Option<CollisionShape>,
}

impl fmt::Debug for SdfModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdfModel")
            .field("form", &self.form)
            .field("collision", &self.collision)
            .finish_non_exhaustive()
    }
}

impl SdfModel {
    pub fn new(form: DistanceField, shading: Arc<ShadingFunction>) -> Self {
        Self {
            form,
            shading,
            collision: None,
        }
    }

    pub fn with_collision(mut self, collision: CollisionShape) -> Self {
        self.collision = Some(collision);
        self
    }

    /// The collision shape with any field-derived parts resolved.
    pub fn resolved_collision(&self) -> Option<CollisionShape> {
        self.collision.as_ref().map(|shape| shape.resolve(&self.form))
    }
}

/// Unions several models into one.
///
/// Each model's form is tagged with its own surface id (`1..=n`), so the merged
/// shading can dispatch on whichever model owns the nearest surface. Collision
/// shapes are resolved against their own forms and merged.
pub fn merge_models(models: Vec<SdfModel>) -> SdfModel {
    let mut forms = Vec::with_capacity(models.len());
    let mut shaders: HashMap<SurfaceId, Arc<ShadingFunction>> = HashMap::with_capacity(models.len());
    let mut collisions = Vec::new();

    for (index, model) in models.into_iter().enumerate() {
        let id = index as SurfaceId + 1;
        if let Some(collision) = model.resolved_collision() {
            collisions.push(collision);
        }
        forms.push(model.form.tagged(id));
        shaders.insert(id, model.shading);
    }

    let form = DistanceField::Union(forms);
    let lookup = form.clone();
    let fallback = Shading::default();
    let shading: Arc<ShadingFunction> = Arc::new(move |p| {
        let id = lookup.evaluate(p).id;
        match shaders.get(&id) {
            Some(shader) => shader(p),
            None => {
                debug_assert_eq!(id, ANONYMOUS_SURFACE);
                fallback
            }
        }
    });

    SdfModel {
        form,
        shading,
        collision: merge_shapes(collisions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{cube, sphere};

    fn red() -> Shading {
        Shading::new(Vector::new(1.0, 0.0, 0.0))
    }

    fn blue() -> Shading {
        Shading::new(Vector::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn merged_shading_follows_the_nearest_model() {
        let left = SdfModel::new(sphere(1.0).translate(Vector::new(-2.0, 0.0, 0.0)), constant_shading(red()));
        let right = SdfModel::new(sphere(1.0).translate(Vector::new(2.0, 0.0, 0.0)), constant_shading(blue()))
            .with_collision(CollisionShape::FieldBounds);
        let merged = merge_models(vec![left, right]);

        assert_eq!((merged.shading)(Point::new(-2.5, 0.0, 0.0)), red());
        assert_eq!((merged.shading)(Point::new(2.5, 0.3, 0.0)), blue());
        assert_eq!(merged.form.evaluate(Point::new(2.0, 0.0, 0.0)).id, 2);
        assert!(matches!(merged.collision, Some(CollisionShape::Transformed { .. })));
    }

    #[test]
    fn merging_nothing_is_empty_space() {
        let merged = merge_models(Vec::new());
        assert_eq!(merged.form.distance(Point::origin()), crate::field::EMPTY_DISTANCE);
        assert_eq!((merged.shading)(Point::origin()), Shading::default());
        assert!(merged.collision.is_none());
    }

    #[test]
    fn shading_defaults() {
        let shading = Shading::new(Vector::new(0.2, 0.4, 0.6));
        assert_eq!(shading.rgba(), [0.2, 0.4, 0.6, 1.0]);
        assert_eq!(shading.specular, 0.8);
        let model = SdfModel::new(cube(Vector::repeat(1.0)), constant_shading(shading));
        assert_eq!((model.shading)(Point::new(9.0, 9.0, 9.0)), shading);
        assert!(model.resolved_collision().is_none());
    }
}
