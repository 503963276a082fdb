//! Regular grid descriptors
//!
//! A [`GridCoordinates`] value pins a regular voxel grid in space. Two grids
//! can only be combined voxel by voxel when they are commensurate: identical
//! spacing and origins that differ by a whole number of voxels.

use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::{Vec3f, Vec3i};

/// Tolerance used when comparing spacings and voxel shifts
pub const GRID_EPSILON: f32 = 1.0e-4;

/// Origin, dimensions and voxel spacing of an axis-aligned regular grid
///
/// Spacing components are expected to be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCoordinates {
    /// Spatial position of the grid's minimum corner
    pub origin: Vec3f,
    /// Number of voxels along each axis
    pub dimensions: Vec3i,
    /// Edge length of a voxel along each axis
    pub spacing: Vec3f,
}

impl GridCoordinates {
    /// Create a grid descriptor
    pub fn new(origin: Vec3f, dimensions: Vec3i, spacing: Vec3f) -> Self {
        Self {
            origin,
            dimensions,
            spacing,
        }
    }

    /// Signed voxel displacement from this grid into `other`
    ///
    /// A voxel `v` of this grid is voxel `v + offset` of `other`. The shift is
    /// rounded half away from zero once it has been verified to be integral
    /// within [`GRID_EPSILON`].
    ///
    /// # Errors
    ///
    /// - [`Error::IncompatibleGrid`] if the spacings differ
    /// - [`Error::MisalignedGrid`] if the origins are not a whole number of
    ///   voxels apart
    /// - [`Error::GridOverflow`] if the offset does not fit in `i32`
    pub fn offset_to(&self, other: &GridCoordinates) -> Result<Vec3i> {
        if (self.spacing - other.spacing).norm() > GRID_EPSILON {
            return Err(Error::IncompatibleGrid {
                spacing: self.spacing,
                other: other.spacing,
            });
        }

        let mut offset = Vec3i::zeros();
        for axis in 0..3 {
            let shift = (f64::from(self.origin[axis]) - f64::from(other.origin[axis]))
                / f64::from(self.spacing[axis]);
            // f64::round is half away from zero
            let whole = shift.round();
            if (shift - whole).abs() > f64::from(GRID_EPSILON) {
                return Err(Error::MisalignedGrid { axis, shift });
            }
            offset[axis] = voxel_count_to_i32(axis, whole)?;
        }
        Ok(offset)
    }

    /// Grow this grid to the smallest aligned grid covering both extents
    ///
    /// The spacing is unchanged. On error (incommensurate grids, or a union
    /// wider than `i32::MAX` voxels) the descriptor is left untouched.
    pub fn extend_by(&mut self, other: &GridCoordinates) -> Result<()> {
        self.offset_to(other)?;

        let mut origin = Vec3f::zeros();
        let mut dimensions = Vec3i::zeros();
        for axis in 0..3 {
            let spacing = f64::from(self.spacing[axis]);
            let start = self.origin[axis].min(other.origin[axis]);
            let this_max = f64::from(self.origin[axis])
                + f64::from(self.dimensions[axis]) * spacing;
            let other_max = f64::from(other.origin[axis])
                + f64::from(other.dimensions[axis]) * f64::from(other.spacing[axis]);
            let span = this_max.max(other_max) - f64::from(start);
            origin[axis] = start;
            dimensions[axis] = voxel_count_to_i32(axis, (span / spacing + 0.5).floor())?;
        }

        debug!(
            origin = ?origin,
            dimensions = ?dimensions,
            "extended grid"
        );
        self.origin = origin;
        self.dimensions = dimensions;
        Ok(())
    }

    /// Whether the voxel lies within `[0, dimensions)` on every axis
    pub fn contains_voxel(&self, voxel: &Vec3i) -> bool {
        (0..3).all(|i| voxel[i] >= 0 && voxel[i] < self.dimensions[i])
    }

    /// Total number of addressable voxels
    pub fn voxel_count(&self) -> i64 {
        self.dimensions.iter().map(|&d| i64::from(d.max(0))).product()
    }

    /// Emit the descriptor at debug level
    pub fn log_summary(&self) {
        debug!(
            dimensions = ?self.dimensions,
            spacing = ?self.spacing,
            origin = ?self.origin,
            "grid coordinates"
        );
    }
}

fn voxel_count_to_i32(axis: usize, voxels: f64) -> Result<i32> {
    if (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&voxels) {
        Ok(voxels as i32)
    } else {
        Err(Error::GridOverflow { axis, voxels })
    }
}

/// `voxel + offset`, failing instead of wrapping when a component overflows
pub(crate) fn shift_voxel(voxel: &Vec3i, offset: &Vec3i) -> Result<Vec3i> {
    checked_componentwise(voxel, offset, i32::checked_add, |v, o| v + o)
}

/// `voxel - offset`, failing instead of wrapping when a component overflows
pub(crate) fn unshift_voxel(voxel: &Vec3i, offset: &Vec3i) -> Result<Vec3i> {
    checked_componentwise(voxel, offset, i32::checked_sub, |v, o| v - o)
}

fn checked_componentwise(
    voxel: &Vec3i,
    offset: &Vec3i,
    op: fn(i32, i32) -> Option<i32>,
    exact: fn(f64, f64) -> f64,
) -> Result<Vec3i> {
    let mut result = Vec3i::zeros();
    for axis in 0..3 {
        result[axis] = op(voxel[axis], offset[axis]).ok_or(Error::GridOverflow {
            axis,
            voxels: exact(f64::from(voxel[axis]), f64::from(offset[axis])),
        })?;
    }
    Ok(result)
}

impl Default for GridCoordinates {
    fn default() -> Self {
        Self {
            origin: Vec3f::zeros(),
            dimensions: Vec3i::zeros(),
            spacing: Vec3f::repeat(1.0),
        }
    }
}

impl fmt::Display for GridCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dimensions {} {} {}, spacing {} {} {}, origin {} {} {}",
            self.dimensions.x,
            self.dimensions.y,
            self.dimensions.z,
            self.spacing.x,
            self.spacing.y,
            self.spacing.z,
            self.origin.x,
            self.origin.y,
            self.origin.z
        )
    }
}
