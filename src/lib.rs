//! # voxfield
//!
//! Sparse scalar fields over regular 3D voxel grids, as used for neural
//! circuit connectivity data (innervation, synapse and bouton densities).
//!
//! A grid can address hundreds of millions of voxels while only a small
//! fraction hold data. A [`SparseField`] stores just those voxels and supports
//! arithmetic between fields on different but commensurate grids.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - Compact storage: ordered location map plus a contiguous value array
//! - Voxel-wise product, quotient and union sum of fields on shifted grids
//! - Pointwise operators (e.g. logarithmic rescaling)
//! - Versioned binary persistence and CSV export
//! - Same-host handoff through named shared segments (`shared-memory` feature)
//!
//! ## Example
//!
//! ```
//! use voxfield::{ops, SparseField, Vec3f, Vec3i};
//!
//! # fn main() -> voxfield::Result<()> {
//! let dims = Vec3i::new(10, 10, 10);
//! let mut boutons = SparseField::new(dims, Vec3f::zeros(), Vec3f::repeat(50.0));
//! let mut spines = SparseField::new(dims, Vec3f::zeros(), Vec3f::repeat(50.0));
//! boutons.add_value(&Vec3i::new(1, 2, 3), 2.0);
//! spines.add_value(&Vec3i::new(1, 2, 3), 0.5);
//! spines.add_value(&Vec3i::new(4, 4, 4), 1.0);
//!
//! let overlap = ops::multiply(&boutons, &spines)?;
//! assert_eq!(overlap.field_value(&Vec3i::new(1, 2, 3)), 1.0);
//! assert_eq!(overlap.len(), 1);
//!
//! let union = (&boutons + &spines)?;
//! assert_eq!(union.field_sum(), 3.5);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod csv;
pub mod error;
pub mod field;
pub mod geometry;
pub mod grid;
pub mod operator;
pub mod ops;
#[cfg(feature = "shared-memory")]
pub mod shmem;

pub use codec::FORMAT_VERSION;
pub use csv::CsvCoordinates;
pub use error::{Error, Result};
pub use field::{DEFAULT_FIELD_VALUE, Iter, LocationIndex, NON_ZERO_THRESHOLD, SparseField};
pub use geometry::{BoundingBox, Vec3f, Vec3i};
pub use grid::{GRID_EPSILON, GridCoordinates};
pub use operator::{FieldOperator, LogOperator};
pub use ops::{add, divide, multiply};
#[cfg(feature = "shared-memory")]
pub use shmem::{SegmentConfig, SegmentGuard, SharedSegment};
