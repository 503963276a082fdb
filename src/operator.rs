//! Pointwise value transforms
//!
//! A [`FieldOperator`] maps one stored value to another and is applied to every
//! defined voxel by [`SparseField::apply_operator`](crate::SparseField::apply_operator).
//! Operators must be pure pointwise functions; the application order is
//! unspecified.

use crate::field::DEFAULT_FIELD_VALUE;

/// A pure transform of a single field value
pub trait FieldOperator {
    /// Transform `value`
    fn calculate(&self, value: f32) -> f32;
}

impl<F> FieldOperator for F
where
    F: Fn(f32) -> f32,
{
    fn calculate(&self, value: f32) -> f32 {
        self(value)
    }
}

/// Logarithmic rescaling: `coefficient * ln(v)` for values above `threshold`
///
/// Values at or below the threshold map to [`DEFAULT_FIELD_VALUE`], which keeps
/// the result finite for zero and negative inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogOperator {
    /// Factor applied to the natural logarithm
    pub coefficient: f32,
    /// Values at or below this are not transformed
    pub threshold: f32,
}

impl LogOperator {
    /// Create a log operator
    pub fn new(coefficient: f32, threshold: f32) -> Self {
        Self {
            coefficient,
            threshold,
        }
    }
}

impl FieldOperator for LogOperator {
    fn calculate(&self, value: f32) -> f32 {
        if value > self.threshold {
            self.coefficient * value.ln()
        } else {
            DEFAULT_FIELD_VALUE
        }
    }
}
