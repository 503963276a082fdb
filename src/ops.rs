//! Voxel-wise arithmetic between two sparse fields
//!
//! The fields may live on different grids as long as the grids are
//! commensurate. [`multiply`] and [`divide`] keep the first operand's grid and
//! only produce values where both operands are defined; [`add`] works on the
//! union grid and keeps every defined location of either operand.

use std::ops::Add;

use tracing::debug;

use crate::error::Result;
use crate::field::SparseField;
use crate::grid::{shift_voxel, unshift_voxel};

/// Product of two fields at the locations defined in both
///
/// The result uses `a`'s grid and its defined set is a subset of `a`'s.
///
/// # Errors
///
/// Fails if the grids are incommensurate (see
/// [`GridCoordinates::offset_to`](crate::GridCoordinates::offset_to)).
pub fn multiply(a: &SparseField, b: &SparseField) -> Result<SparseField> {
    combine_intersection(a, b, |x, y| x * y)
}

/// Quotient of two fields at the locations defined in both
///
/// No zero check is made; a zero divisor produces an infinity or NaN.
pub fn divide(a: &SparseField, b: &SparseField) -> Result<SparseField> {
    combine_intersection(a, b, |x, y| x / y)
}

fn combine_intersection<F>(a: &SparseField, b: &SparseField, op: F) -> Result<SparseField>
where
    F: Fn(f32, f32) -> f32,
{
    let b_coordinates = b.coordinates();
    let offset = a.coordinates().offset_to(&b_coordinates)?;
    debug!(
        offset = ?offset,
        lhs = a.len(),
        rhs = b.len(),
        "combining fields on shared locations"
    );

    let mut result = SparseField::from_coordinates(&a.coordinates());
    for (&index, &slot) in &a.index_map {
        // A location whose image overflows i32 cannot lie inside B
        let Ok(location_b) = shift_voxel(&a.xyz_from_index(index)?, &offset) else {
            continue;
        };
        if !b_coordinates.contains_voxel(&location_b) {
            continue;
        }
        if let Some(value_b) = b.stored_value(&location_b) {
            result.index_map.insert(index, result.values.len());
            result.values.push(op(a.values[slot], value_b));
        }
    }
    Ok(result)
}

/// Sum of two fields over the union of their grids
///
/// The result grid is the smallest grid aligned with both inputs that covers
/// both extents. Every defined location of either operand is defined in the
/// result; overlapping locations are summed.
///
/// # Errors
///
/// Fails if the grids are incommensurate, or with
/// [`Error::GridOverflow`](crate::Error::GridOverflow) if the union grid or a
/// shifted location does not fit in `i32`.
pub fn add(a: &SparseField, b: &SparseField) -> Result<SparseField> {
    let mut union_grid = a.coordinates();
    union_grid.extend_by(&b.coordinates())?;

    let offset_a = union_grid.offset_to(&a.coordinates())?;
    let offset_b = union_grid.offset_to(&b.coordinates())?;
    debug!(
        offset_a = ?offset_a,
        offset_b = ?offset_b,
        lhs = a.len(),
        rhs = b.len(),
        "adding fields on union grid"
    );

    let mut result = SparseField::from_coordinates(&union_grid);
    for (field, offset) in [(a, offset_a), (b, offset_b)] {
        for (&index, &slot) in &field.index_map {
            let location = unshift_voxel(&field.xyz_from_index(index)?, &offset)?;
            result.add_value(&location, field.values[slot]);
        }
    }
    Ok(result)
}

impl Add for &SparseField {
    type Output = Result<SparseField>;

    fn add(self, rhs: &SparseField) -> Self::Output {
        add(self, rhs)
    }
}
