//! Native spatial image representation.
//!
//! [`SpatialImage`] is the image object augmentations resample in physical
//! space. It is only ever constructed from a file via [`read_image`] or from
//! explicit origin/spacing/direction; see
//! [`array_affine_to_native_image`](crate::transforms::array_affine_to_native_image)
//! for going from an array and an affine.

mod image;
mod resample;

pub use image::{read_image, Matrix3, SpatialImage};
pub use resample::{Interpolation, PhysicalTransform};
