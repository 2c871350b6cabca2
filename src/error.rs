//! Error types for voxaug.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by NIfTI I/O, image conversion and transform configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The first bytes of the header are not a NIfTI-1 signature.
    #[error("invalid NIfTI magic bytes: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Datatype code not handled by this crate.
    #[error("unsupported data type code: {0}")]
    UnsupportedDataType(i16),

    /// Header dimensions, spacing or offsets are inconsistent.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// File is structurally valid but uses features that are not supported.
    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Affine or direction matrix cannot be used (singular, non-finite).
    #[error("invalid affine: {0}")]
    InvalidAffine(String),

    /// Array shape does not match what the operation expects.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
