//! Error taxonomy for the parts of the crate that can actually fail.
//!
//! Interactive searches never return an `Err` — an exhausted open heap is a
//! reported outcome (see [`crate::search::ExitReason`]), not a failure. Only
//! construction-time invalid input and storage-backend I/O faults are
//! [`TraceError`]s, matching the propagation policy in spec.md §7.

use thiserror::Error;

/// Fatal errors raised when constructing a search/trace or while an automatic
/// trace's storage backend is doing synchronous I/O.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("volume spacing must be strictly positive on every axis, got ({sx}, {sy}, {sz})")]
    ZeroSpacing { sx: f64, sy: f64, sz: f64 },

    #[error("seed voxel ({x}, {y}, {z}) is out of volume bounds")]
    SeedOutOfBounds { x: i64, y: i64, z: i64 },

    #[error("automatic trace requires at least one seed voxel")]
    MissingSeed,

    #[error("region filler requires at least one source path")]
    MissingSourcePaths,

    #[error("storage backend I/O failure: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("storage backend capacity exceeded: {0}")]
    OutOfMemory(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
