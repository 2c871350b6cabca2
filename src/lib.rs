#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `voxaug` holds the pieces random augmentations of 3D medical volumes are
//! built from:
//!
//! - [`RandomTransform`]: seeding, parameter drawing and dispatch for
//!   randomized transforms, with [`RandomState`] carrying the seed;
//! - [`parse_range`], [`parse_degrees`] and [`parse_translation`] for
//!   validating `(min, max)` arguments;
//! - [`array_affine_to_native_image`] for turning an array plus affine into
//!   a [`SpatialImage`] positioned in physical space.
//!
//! Concrete transforms ([`RandomFlip`], [`RandomNoise`], [`RandomAffine`])
//! operate on a [`Sample`] of NIfTI images.
//!
//! # Example
//!
//! ```no_run
//! use voxaug::{nifti, RandomAffine, RandomTransform, Sample, SampleImage};
//!
//! let image = nifti::load("t1.nii.gz")?;
//! let sample = Sample::new().with("t1", SampleImage::intensity(image));
//!
//! let affine = RandomAffine::builder().degrees(10.0).seed(42).build()?;
//! let augmented = affine.invoke(sample)?;
//! # Ok::<(), voxaug::Error>(())
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod nifti;
pub mod random;
pub mod sample;
pub mod spatial;
pub mod transforms;

pub use error::{Error, Result};
pub use random::{manual_seed, Generator};
pub use sample::{ImageKind, Sample, SampleImage};
pub use spatial::{read_image, Interpolation, PhysicalTransform, SpatialImage};
pub use transforms::{
    array_affine_to_native_image, array_affine_to_native_image_in, parse_degrees, parse_range,
    parse_translation, RandomAffine, RandomFlip, RandomNoise, RandomState, RandomTransform,
    RangeArg, Transform,
};
