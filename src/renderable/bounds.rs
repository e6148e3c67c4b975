use glam::Vec3;

use super::Transform;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 0.0,
        }
    }
}

impl BoundingSphere {
    #[must_use]
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Moves the sphere into world space; the radius grows with the largest
    /// axis scale so the sphere stays conservative under non-uniform scale.
    #[must_use]
    pub fn transformed(&self, transform: &Transform) -> Self {
        Self {
            center: transform.world_matrix().transform_point3(self.center),
            radius: self.radius * transform.max_axis_scale(),
        }
    }

    /// Smallest sphere around the centroid that contains every input sphere.
    pub fn enclosing(spheres: impl IntoIterator<Item = BoundingSphere>) -> Option<Self> {
        let spheres: Vec<BoundingSphere> = spheres.into_iter().collect();
        if spheres.is_empty() {
            return None;
        }

        let center = spheres.iter().map(|s| s.center).sum::<Vec3>() / spheres.len() as f32;
        let radius = spheres
            .iter()
            .map(|s| s.center.distance(center) + s.radius)
            .fold(0.0_f32, f32::max);

        Some(Self { center, radius })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enclosing_contains_inputs() {
        let a = BoundingSphere::new(Vec3::new(-2.0, 0.0, 0.0), 1.0);
        let b = BoundingSphere::new(Vec3::new(2.0, 0.0, 0.0), 1.0);
        let s = BoundingSphere::enclosing([a, b]).unwrap();
        assert!(s.center.length() < 1e-5);
        assert!((s.radius - 3.0).abs() < 1e-5);
        assert!(BoundingSphere::enclosing([]).is_none());
    }
}
