use glam::Vec3;
use sectorview_core::config::ClippingConfig;
use sectorview_core::math::{Aabb, Plane};

/// Index of each plane in [`BoundingBoxClipper::clipping_planes`].
pub const MIN_X_PLANE: usize = 0;
pub const MAX_X_PLANE: usize = 1;
pub const MIN_Y_PLANE: usize = 2;
pub const MAX_Y_PLANE: usize = 3;
pub const MIN_Z_PLANE: usize = 4;
pub const MAX_Z_PLANE: usize = 5;

/// Six clipping planes derived from an axis-aligned box.
///
/// With `intersection == false` the planes keep the box interior. With
/// `intersection == true` every plane is flipped so the interior is cut
/// away instead. Every mutator recomputes all six planes before returning,
/// so the planes always describe the current box and mode.
#[derive(Debug, Clone)]
pub struct BoundingBoxClipper {
    bounds: Aabb,
    intersection: bool,
    planes: [Plane; 6],
}

impl Default for BoundingBoxClipper {
    fn default() -> Self {
        Self::new(Aabb::default(), false)
    }
}

impl From<&ClippingConfig> for BoundingBoxClipper {
    fn from(config: &ClippingConfig) -> Self {
        Self::new(Aabb::default(), config.intersection)
    }
}

impl BoundingBoxClipper {
    pub fn new(bounds: Aabb, intersection: bool) -> Self {
        let mut clipper = Self {
            bounds,
            intersection,
            planes: [Plane::default(); 6],
        };
        clipper.update_planes();
        clipper
    }

    /// Current planes in min-x, max-x, min-y, max-y, min-z, max-z order.
    ///
    /// The borrow ends before any setter can run, so a caller never holds
    /// planes that disagree with the box.
    pub fn clipping_planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn bounding_box(&self) -> Aabb {
        self.bounds
    }

    /// Replace all six bounds at once.
    pub fn set_box(&mut self, bounds: Aabb) {
        self.bounds = bounds;
        self.update_planes();
    }

    pub fn intersection(&self) -> bool {
        self.intersection
    }

    pub fn set_intersection(&mut self, intersection: bool) {
        self.intersection = intersection;
        self.update_planes();
    }

    pub fn min_x(&self) -> f32 {
        self.bounds.min.x
    }

    pub fn set_min_x(&mut self, x: f32) {
        self.bounds.min.x = x;
        self.update_planes();
    }

    pub fn min_y(&self) -> f32 {
        self.bounds.min.y
    }

    pub fn set_min_y(&mut self, y: f32) {
        self.bounds.min.y = y;
        self.update_planes();
    }

    pub fn min_z(&self) -> f32 {
        self.bounds.min.z
    }

    pub fn set_min_z(&mut self, z: f32) {
        self.bounds.min.z = z;
        self.update_planes();
    }

    pub fn max_x(&self) -> f32 {
        self.bounds.max.x
    }

    pub fn set_max_x(&mut self, x: f32) {
        self.bounds.max.x = x;
        self.update_planes();
    }

    pub fn max_y(&self) -> f32 {
        self.bounds.max.y
    }

    pub fn set_max_y(&mut self, y: f32) {
        self.bounds.max.y = y;
        self.update_planes();
    }

    pub fn max_z(&self) -> f32 {
        self.bounds.max.z
    }

    pub fn set_max_z(&mut self, z: f32) {
        self.bounds.max.z = z;
        self.update_planes();
    }

    fn update_planes(&mut self) {
        let Aabb { min, max } = self.bounds;
        self.planes = [
            Plane::from_normal_and_coplanar_point(Vec3::X, Vec3::new(min.x, 0.0, 0.0)),
            Plane::from_normal_and_coplanar_point(Vec3::NEG_X, Vec3::new(max.x, 0.0, 0.0)),
            Plane::from_normal_and_coplanar_point(Vec3::Y, Vec3::new(0.0, min.y, 0.0)),
            Plane::from_normal_and_coplanar_point(Vec3::NEG_Y, Vec3::new(0.0, max.y, 0.0)),
            Plane::from_normal_and_coplanar_point(Vec3::Z, Vec3::new(0.0, 0.0, min.z)),
            Plane::from_normal_and_coplanar_point(Vec3::NEG_Z, Vec3::new(0.0, 0.0, max.z)),
        ];

        if self.intersection {
            for plane in &mut self.planes {
                plane.negate();
            }
        }
    }
}
