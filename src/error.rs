//! Error types for sparse field operations
//!
//! This module provides the single error type used across the crate. All errors
//! carry an error code for categorization and enough context to locate the
//! offending grid, voxel or byte stream.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O and shared-memory errors
//! - **E2xxx**: Grid alignment and index errors
//! - **E3xxx**: Field contract violations
//! - **E4xxx**: Persistence format errors
//!
//! ## Common Error Codes
//!
//! - `E1001`: I/O error (file open, segment create/attach)
//! - `E1002`: Shared segment already exists
//! - `E1003`: Shared segment too small for the payload
//! - `E2001`: Grids have different voxel spacing
//! - `E2002`: Grid origins are not shifted by whole voxels
//! - `E2003`: Negative flat index
//! - `E2004`: Flat index does not round-trip through the dimensions
//! - `E2005`: Voxel offset or grid extent beyond the `i32` range
//! - `E3001`: Location has no stored value
//! - `E3002`: Point lies outside the grid
//! - `E3003`: Location and value lists differ in length
//! - `E4001`: Unsupported format version
//! - `E4002`: Corrupt serialized data

use std::io;
use thiserror::Error;

use crate::geometry::{Vec3f, Vec3i};

/// Result type for sparse field operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building, combining or persisting sparse fields
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading or writing
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - File not found
    /// - Insufficient permissions
    /// - Shared segment does not exist when attaching
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// A shared segment with the requested key already exists
    ///
    /// **Error Code**: E1002
    ///
    /// **Suggestions**:
    /// - Use a unique key per handoff
    /// - Remove stale segments left behind by a crashed producer
    #[error("[E1002] Shared segment '{0}' already exists")]
    SegmentExists(String),

    /// The payload does not fit the shared segment
    ///
    /// **Error Code**: E1003
    #[error("[E1003] Shared segment '{key}' holds {size} bytes, {required} required")]
    SegmentTooSmall {
        /// Segment key
        key: String,
        /// Segment size in bytes
        size: u64,
        /// Bytes the payload needs
        required: u64,
    },

    /// Two grids have different voxel spacing
    ///
    /// **Error Code**: E2001
    ///
    /// **Suggestions**:
    /// - Resample one of the fields onto the other's spacing first
    #[error("[E2001] Incompatible grids: spacing {spacing:?} differs from {other:?}")]
    IncompatibleGrid {
        /// Spacing of the receiving grid
        spacing: Vec3f,
        /// Spacing of the other grid
        other: Vec3f,
    },

    /// Grid origins are not shifted by an integer number of voxels
    ///
    /// **Error Code**: E2002
    #[error("[E2002] Misaligned grids: origin shift of {shift} voxels along axis {axis}")]
    MisalignedGrid {
        /// Axis (0 = x, 1 = y, 2 = z) with the fractional shift
        axis: usize,
        /// Shift in voxel units
        shift: f64,
    },

    /// A flat location index is negative
    ///
    /// **Error Code**: E2003
    #[error("[E2003] Invalid location index: {0}")]
    InvalidIndex(i64),

    /// A flat index does not survive decoding and re-encoding
    ///
    /// **Error Code**: E2004
    ///
    /// **Common Causes**:
    /// - Degenerate (zero) dimensions
    /// - Index larger than the grid can address
    #[error("[E2004] Location index {index} does not round-trip through dimensions {dimensions:?}")]
    IndexRoundTrip {
        /// Offending index
        index: i64,
        /// Grid dimensions used for decoding
        dimensions: Vec3i,
    },

    /// A voxel offset, grid extent or shifted location does not fit in `i32`
    ///
    /// **Error Code**: E2005
    ///
    /// **Common Causes**:
    /// - Very fine spacing combined with distant origins
    #[error("[E2005] Grid overflow: {voxels} voxels along axis {axis} exceed the addressable range")]
    GridOverflow {
        /// Axis (0 = x, 1 = y, 2 = z) that overflowed
        axis: usize,
        /// Offending offset, extent or coordinate in voxel units
        voxels: f64,
    },

    /// Tried to overwrite a location that holds no value
    ///
    /// **Error Code**: E3001
    ///
    /// **Suggestions**:
    /// - Use `add_value` to create new entries
    #[error("[E3001] No value defined at location {0:?}")]
    UndefinedLocation(Vec3i),

    /// A point lies outside the grid
    ///
    /// **Error Code**: E3002
    #[error("[E3002] Point {point:?} is outside the grid along axis {axis}")]
    OutOfGrid {
        /// Spatial point that was queried
        point: Vec3f,
        /// First axis on which the point is out of range
        axis: usize,
    },

    /// Location and value lists have different lengths
    ///
    /// **Error Code**: E3003
    #[error("[E3003] Cannot create field: {locations} locations but {values} values")]
    SizeMismatch {
        /// Number of locations supplied
        locations: usize,
        /// Number of values supplied
        values: usize,
    },

    /// The serialized version tag is not supported
    ///
    /// **Error Code**: E4001
    #[error("[E4001] Unsupported format version '{found}', expected '{expected}'")]
    VersionMismatch {
        /// Version read from the stream
        found: String,
        /// Version this crate reads and writes
        expected: &'static str,
    },

    /// Serialized data violates the field invariants
    ///
    /// **Error Code**: E4002
    ///
    /// **Common Causes**:
    /// - Truncated file or segment
    /// - Negative or duplicate location index
    /// - Value index outside the value array
    #[error("[E4002] Corrupt field data: {0}")]
    CorruptData(String),
}

impl Error {
    /// Create a CorruptData error describing what was being decoded
    ///
    /// # Arguments
    /// * `context` - The part of the stream being decoded (e.g., "index map")
    /// * `message` - Description of the problem
    pub fn corrupt(context: &str, message: impl std::fmt::Display) -> Self {
        Error::CorruptData(format!("{}: {}", context, message))
    }

    /// Short, stable error code of this error (e.g., `"E2002"`)
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "E1001",
            Error::SegmentExists(_) => "E1002",
            Error::SegmentTooSmall { .. } => "E1003",
            Error::IncompatibleGrid { .. } => "E2001",
            Error::MisalignedGrid { .. } => "E2002",
            Error::InvalidIndex(_) => "E2003",
            Error::IndexRoundTrip { .. } => "E2004",
            Error::GridOverflow { .. } => "E2005",
            Error::UndefinedLocation(_) => "E3001",
            Error::OutOfGrid { .. } => "E3002",
            Error::SizeMismatch { .. } => "E3003",
            Error::VersionMismatch { .. } => "E4001",
            Error::CorruptData(_) => "E4002",
        }
    }
}
