//! Transforms applied to a [`Sample`](crate::sample::Sample).

mod augment;
mod base;
mod random_transform;

pub use augment::{
    AffineParams, NoiseParams, RandomAffine, RandomAffineBuilder, RandomFlip, RandomFlipBuilder,
    RandomNoise, RandomNoiseBuilder,
};
pub use base::Transform;
pub use random_transform::{
    array_affine_to_native_image, array_affine_to_native_image_in, parse_degrees, parse_range,
    parse_translation, RandomState, RandomTransform, RangeArg,
};
