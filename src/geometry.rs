//! Vector primitives and axis-aligned boxes
//!
//! Voxel locations are integer 3-vectors and spatial positions are float
//! 3-vectors, both backed by nalgebra so componentwise arithmetic, equality
//! and indexed access come for free.

use nalgebra::Vector3;

/// Integer 3-vector (voxel coordinates, grid dimensions, voxel offsets)
pub type Vec3i = Vector3<i32>;

/// Float 3-vector (spatial positions, origins, voxel spacing)
pub type Vec3f = Vector3<f32>;

/// An axis-aligned bounding box in spatial coordinates
///
/// The empty box (see [`BoundingBox::empty`]) is a sentinel with inverted
/// bounds. Callers must check [`BoundingBox::is_empty`] before using the
/// corners of a box returned by a query that can come up empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: Vec3f,
    /// Maximum corner
    pub max: Vec3f,
}

impl BoundingBox {
    /// Create a box from its two corners
    pub fn new(min: Vec3f, max: Vec3f) -> Self {
        Self { min, max }
    }

    /// The empty sentinel box
    pub fn empty() -> Self {
        Self {
            min: Vec3f::repeat(f32::INFINITY),
            max: Vec3f::repeat(f32::NEG_INFINITY),
        }
    }

    /// Whether the box encloses no volume along some axis
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    /// Edge lengths of the box (zero for an empty box)
    pub fn extent(&self) -> Vec3f {
        if self.is_empty() {
            return Vec3f::zeros();
        }
        self.max - self.min
    }

    /// Whether the point lies inside the box (bounds inclusive)
    pub fn contains(&self, point: &Vec3f) -> bool {
        (0..3).all(|i| self.min[i] <= point[i] && point[i] <= self.max[i])
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}
