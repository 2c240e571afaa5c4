use glam::Vec3;

use crate::error::CoreError;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    /// The unit box from the origin to (1, 1, 1).
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        }
    }
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Build a box, rejecting one whose min exceeds its max on any axis.
    pub fn try_new(min: Vec3, max: Vec3) -> Result<Self, CoreError> {
        let aabb = Self { min, max };
        if !aabb.is_valid() {
            return Err(CoreError::InvalidBounds {
                min: min.to_array(),
                max: max.to_array(),
            });
        }
        Ok(aabb)
    }

    /// Whether min <= max on every axis.
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Inclusive containment test.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Smallest sphere centered on the box that encloses it.
    pub fn bounding_sphere(&self) -> Sphere {
        Sphere {
            center: self.center(),
            radius: self.size().length() * 0.5,
        }
    }
}

/// Bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Infinite plane satisfying `normal · p + constant = 0`.
///
/// Points with a positive signed distance lie on the kept side when the
/// plane is used for clipping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub constant: f32,
}

impl Plane {
    pub const fn new(normal: Vec3, constant: f32) -> Self {
        Self { normal, constant }
    }

    /// Plane with the given (unit) normal passing through `point`.
    pub fn from_normal_and_coplanar_point(normal: Vec3, point: Vec3) -> Self {
        Self {
            normal,
            constant: -point.dot(normal),
        }
    }

    /// Flip the plane so the kept side becomes the clipped side.
    pub fn negate(&mut self) {
        self.normal = -self.normal;
        self.constant = -self.constant;
    }

    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.constant
    }
}
