//! `NIfTI` file format support.
//!
//! `NIfTI` (Neuroimaging Informatics Technology Initiative) is the standard
//! on-disk format for neuroimaging volumes. This module reads and writes
//! single-file NIfTI-1 images (`.nii` and `.nii.gz`).

pub(crate) mod header;
pub(crate) mod image;
pub mod io;

/// 4×4 voxel-index to world (RAS+, millimetre) transform, row major.
pub type Affine = [[f64; 4]; 4];

pub use header::{DataType, NiftiHeader, SpatialUnits, XFORM_ALIGNED_ANAT};
pub use image::{ArrayData, NiftiElement, NiftiImage};
pub use io::{load, load_header, save};
