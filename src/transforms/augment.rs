//! Random augmentation transforms for data augmentation in ML training.
//!
//! Each transform is configured through a builder, validated at `build()`,
//! and run with [`RandomTransform::invoke`]. Intensity-only transforms skip
//! label images; spatial ones move labels with nearest-neighbour sampling.

use super::base::Transform;
use super::random_transform::{
    array_affine_to_native_image, parse_degrees, parse_range, parse_translation, RandomState,
    RandomTransform, RangeArg,
};
use crate::error::{Error, Result};
use crate::nifti::{ArrayData, NiftiImage};
use crate::random::Generator;
use crate::sample::Sample;
use crate::spatial::{Interpolation, PhysicalTransform, SpatialImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Options every random transform builder accepts.
#[derive(Debug, Clone, Default)]
struct StateOptions {
    seed: Option<u64>,
    verbose: bool,
    generator: Option<Generator>,
}

impl StateOptions {
    fn build(self) -> RandomState {
        let state = RandomState::new(self.seed, self.verbose);
        match self.generator {
            Some(generator) => state.with_generator(generator),
            None => state,
        }
    }
}

macro_rules! state_setters {
    () => {
        /// Reseed the generator with `seed` on every invocation.
        pub fn seed(mut self, seed: u64) -> Self {
            self.state.seed = Some(seed);
            self
        }

        /// Set an optional seed.
        pub fn seed_opt(mut self, seed: Option<u64>) -> Self {
            self.state.seed = seed;
            self
        }

        /// Log the time spent in each call.
        pub fn verbose(mut self, verbose: bool) -> Self {
            self.state.verbose = verbose;
            self
        }

        /// Draw from `generator` instead of the process-wide one.
        pub fn generator(mut self, generator: Generator) -> Self {
            self.state.generator = Some(generator);
            self
        }
    };
}

fn uniform(rng: &mut ChaCha8Rng, (min, max): (f64, f64)) -> f64 {
    if min == max {
        min
    } else {
        rng.gen_range(min..=max)
    }
}

/// Bounds and their span must be finite for uniform sampling.
fn ensure_finite(range: (f64, f64), name: &str) -> Result<(f64, f64)> {
    if (range.1 - range.0).is_finite() {
        Ok(range)
    } else {
        Err(Error::InvalidArgument(format!(
            "{} bounds and their span must be finite, got {:?}",
            name, range
        )))
    }
}

// ---------------------------------------------------------------------------
// RandomFlip
// ---------------------------------------------------------------------------

/// Reverse the voxel order along randomly chosen axes.
///
/// Each listed axis is flipped independently with `flip_probability`. All
/// images in the sample are flipped along the same axes. Only the voxel
/// array changes; the affine is kept.
#[derive(Debug, Clone)]
pub struct RandomFlip {
    axes: Vec<usize>,
    flip_probability: f64,
    state: RandomState,
}

impl RandomFlip {
    /// Start configuring a flip. Defaults: axis 0, probability 0.5.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let flip = RandomFlip::builder().axes(&[0, 1, 2]).seed(42).build()?;
    /// let flipped = flip.invoke(sample)?;
    /// ```
    pub fn builder() -> RandomFlipBuilder {
        RandomFlipBuilder::default()
    }

    /// Axes that may be flipped, sorted and without duplicates.
    pub fn axes(&self) -> &[usize] {
        &self.axes
    }

    /// Probability of flipping each axis.
    pub fn flip_probability(&self) -> f64 {
        self.flip_probability
    }
}

impl Transform for RandomFlip {
    fn apply_transform(&self, mut sample: Sample) -> Result<Sample> {
        let axes = self.sample_params();
        if axes.is_empty() {
            return Ok(sample);
        }
        for (name, entry) in sample.iter_mut() {
            let ndim = entry.image.ndim();
            if let Some(&axis) = axes.iter().find(|&&a| a >= ndim) {
                return Err(Error::InvalidDimensions(format!(
                    "cannot flip axis {} of {}D image '{}'",
                    axis, ndim, name
                )));
            }
            let mut data = entry.image.data().clone();
            for &axis in &axes {
                data.invert_axis(axis);
            }
            entry.image = entry.image.with_data(data)?;
        }
        Ok(sample)
    }

    fn is_verbose(&self) -> bool {
        self.state.verbose()
    }
}

impl RandomTransform for RandomFlip {
    /// Axes to flip in this call.
    type Params = Vec<usize>;

    fn random_state(&self) -> &RandomState {
        &self.state
    }

    fn get_params(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        self.axes
            .iter()
            .filter(|_| rng.gen::<f64>() < self.flip_probability)
            .copied()
            .collect()
    }
}

/// Builder for [`RandomFlip`].
#[derive(Debug, Clone)]
pub struct RandomFlipBuilder {
    axes: Vec<usize>,
    flip_probability: f64,
    state: StateOptions,
}

impl Default for RandomFlipBuilder {
    fn default() -> Self {
        Self {
            axes: vec![0],
            flip_probability: 0.5,
            state: StateOptions::default(),
        }
    }
}

impl RandomFlipBuilder {
    /// Axes that may be flipped (0, 1 or 2).
    pub fn axes(mut self, axes: &[usize]) -> Self {
        self.axes = axes.to_vec();
        self
    }

    /// Probability of flipping each axis.
    pub fn flip_probability(mut self, probability: f64) -> Self {
        self.flip_probability = probability;
        self
    }

    state_setters!();

    /// Validate the configuration.
    ///
    /// Fails with [`Error::InvalidArgument`] for out-of-range settings.
    #[must_use = "this returns the configured transform"]
    pub fn build(self) -> Result<RandomFlip> {
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return Err(Error::InvalidArgument(format!(
                "flip_probability must be in [0, 1], not {}",
                self.flip_probability
            )));
        }
        if let Some(axis) = self.axes.iter().find(|&&a| a > 2) {
            return Err(Error::InvalidArgument(format!(
                "flip axes must be 0, 1 or 2, not {}",
                axis
            )));
        }
        let mut axes = self.axes;
        axes.sort_unstable();
        axes.dedup();
        Ok(RandomFlip {
            axes,
            flip_probability: self.flip_probability,
            state: self.state.build(),
        })
    }
}

// ---------------------------------------------------------------------------
// RandomNoise
// ---------------------------------------------------------------------------

/// Add zero-mean Gaussian noise to intensity images.
///
/// The standard deviation is drawn uniformly from the `std` range once per
/// call. Label images are left untouched. Noisy images are stored as `f32`.
#[derive(Debug, Clone)]
pub struct RandomNoise {
    std: (f64, f64),
    state: RandomState,
}

/// Draws for one [`RandomNoise`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseParams {
    pub std: f64,
    /// Base seed for the per-chunk noise streams.
    pub seed: u64,
}

impl RandomNoise {
    /// Start configuring noise. Default std range: `(0, 0.25)`.
    pub fn builder() -> RandomNoiseBuilder {
        RandomNoiseBuilder::default()
    }

    /// Range the standard deviation is drawn from.
    pub fn std_range(&self) -> (f64, f64) {
        self.std
    }
}

impl Transform for RandomNoise {
    fn apply_transform(&self, mut sample: Sample) -> Result<Sample> {
        let params = self.sample_params();
        let mut seeds = ChaCha8Rng::seed_from_u64(params.seed);
        for (_, entry) in sample.iter_mut() {
            if entry.is_label() {
                continue;
            }
            entry.image = add_gaussian_noise(&entry.image, params.std as f32, seeds.gen())?;
        }
        Ok(sample)
    }

    fn is_verbose(&self) -> bool {
        self.state.verbose()
    }
}

impl RandomTransform for RandomNoise {
    type Params = NoiseParams;

    fn random_state(&self) -> &RandomState {
        &self.state
    }

    fn get_params(&self, rng: &mut ChaCha8Rng) -> NoiseParams {
        NoiseParams {
            std: uniform(rng, self.std),
            seed: rng.gen(),
        }
    }
}

/// Box-Muller noise, filled in parallel chunks with one stream per chunk so
/// the result does not depend on scheduling.
fn add_gaussian_noise(image: &NiftiImage, std: f32, seed: u64) -> Result<NiftiImage> {
    const CHUNK_SIZE: usize = 8192;

    let mut data = image.to_f32();
    if data.as_slice_memory_order().is_none() {
        data = data.as_standard_layout().into_owned();
    }
    let slice = data.as_slice_memory_order_mut().ok_or_else(|| {
        Error::ShapeMismatch("array must be contiguous for noise operation".to_string())
    })?;

    slice
        .par_chunks_mut(CHUNK_SIZE)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(chunk_idx as u64));
            for v in chunk.iter_mut() {
                let u1: f32 = rng.gen::<f32>().max(1e-10);
                let u2: f32 = rng.gen();
                *v += (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos() * std;
            }
        });

    image.with_data_f32(data)
}

/// Builder for [`RandomNoise`].
#[derive(Debug, Clone)]
pub struct RandomNoiseBuilder {
    std: RangeArg,
    state: StateOptions,
}

impl Default for RandomNoiseBuilder {
    fn default() -> Self {
        Self {
            std: RangeArg::Scalar(0.25),
            state: StateOptions::default(),
        }
    }
}

impl RandomNoiseBuilder {
    /// Noise standard deviation range. A scalar `s` means `(0, s)`.
    pub fn std(mut self, std: impl Into<RangeArg>) -> Self {
        self.std = std.into();
        self
    }

    state_setters!();

    /// Validate the configuration.
    ///
    /// Fails with [`Error::InvalidArgument`] for out-of-range settings.
    #[must_use = "this returns the configured transform"]
    pub fn build(self) -> Result<RandomNoise> {
        let parsed = ensure_finite(parse_range(self.std.clone(), "std")?, "std")?;
        let std = match self.std {
            RangeArg::Scalar(_) => (0.0, parsed.1),
            RangeArg::Sequence(_) => parsed,
        };
        if std.0 < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "std must be non-negative, not {:?}",
                std
            )));
        }
        Ok(RandomNoise {
            std,
            state: self.state.build(),
        })
    }
}

// ---------------------------------------------------------------------------
// RandomAffine
// ---------------------------------------------------------------------------

/// Random isotropic scaling, rotation and translation about the image centre.
///
/// Every image must be 3D. Each one is converted to a [`SpatialImage`] with
/// [`array_affine_to_native_image`] and resampled on its own grid; label
/// images always use nearest-neighbour sampling. Voxels mapped from outside
/// the field of view are set to zero. Angles are in degrees and
/// translations in millimetres, both in LPS physical space.
#[derive(Debug, Clone)]
pub struct RandomAffine {
    scales: (f64, f64),
    degrees: (f64, f64),
    translation: (f64, f64),
    image_interpolation: Interpolation,
    state: RandomState,
}

/// Draws for one [`RandomAffine`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    pub scale: f64,
    pub degrees: [f64; 3],
    pub translation: [f64; 3],
}

impl RandomAffine {
    /// Start configuring an affine augmentation.
    ///
    /// Defaults: scales `(0.9, 1.1)`, degrees `10`, no translation,
    /// trilinear interpolation for intensity images.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let affine = RandomAffine::builder()
    ///     .degrees((-15.0, 15.0))
    ///     .translation(5.0)
    ///     .seed(7)
    ///     .build()?;
    /// ```
    pub fn builder() -> RandomAffineBuilder {
        RandomAffineBuilder::default()
    }

    /// Range of the isotropic scaling factor.
    pub fn scales(&self) -> (f64, f64) {
        self.scales
    }

    /// Range of each rotation angle, in degrees.
    pub fn degrees(&self) -> (f64, f64) {
        self.degrees
    }

    /// Range of each translation offset, in millimetres.
    pub fn translation(&self) -> (f64, f64) {
        self.translation
    }

    fn transform_image(
        &self,
        image: &NiftiImage,
        params: &AffineParams,
        interpolation: Interpolation,
    ) -> Result<NiftiImage> {
        let native = to_native(image)?;
        let transform = PhysicalTransform::from_euler_degrees(
            params.scale,
            params.degrees,
            params.translation,
            native.physical_center(),
        );
        let resampled = native.resample(&transform, interpolation, 0.0)?;
        image.with_data(resampled.into_data())
    }
}

impl Transform for RandomAffine {
    fn apply_transform(&self, mut sample: Sample) -> Result<Sample> {
        let params = self.sample_params();
        for (name, entry) in sample.iter_mut() {
            if entry.image.ndim() != 3 {
                return Err(Error::InvalidDimensions(format!(
                    "affine augmentation needs 3D images, '{}' has shape {:?}",
                    name,
                    entry.image.shape()
                )));
            }
            let interpolation = if entry.is_label() {
                Interpolation::Nearest
            } else {
                self.image_interpolation
            };
            entry.image = self.transform_image(&entry.image, &params, interpolation)?;
        }
        Ok(sample)
    }

    fn is_verbose(&self) -> bool {
        self.state.verbose()
    }
}

impl RandomTransform for RandomAffine {
    type Params = AffineParams;

    fn random_state(&self) -> &RandomState {
        &self.state
    }

    fn get_params(&self, rng: &mut ChaCha8Rng) -> AffineParams {
        let scale = uniform(rng, self.scales);
        let degrees = [(); 3].map(|_| uniform(rng, self.degrees));
        let translation = [(); 3].map(|_| uniform(rng, self.translation));
        AffineParams {
            scale,
            degrees,
            translation,
        }
    }
}

fn to_native(image: &NiftiImage) -> Result<SpatialImage> {
    let affine = image.affine();
    match image.data() {
        ArrayData::U8(a) => array_affine_to_native_image(a, &affine),
        ArrayData::I8(a) => array_affine_to_native_image(a, &affine),
        ArrayData::I16(a) => array_affine_to_native_image(a, &affine),
        ArrayData::U16(a) => array_affine_to_native_image(a, &affine),
        ArrayData::I32(a) => array_affine_to_native_image(a, &affine),
        ArrayData::U32(a) => array_affine_to_native_image(a, &affine),
        ArrayData::I64(a) => array_affine_to_native_image(a, &affine),
        ArrayData::U64(a) => array_affine_to_native_image(a, &affine),
        ArrayData::F32(a) => array_affine_to_native_image(a, &affine),
        ArrayData::F64(a) => array_affine_to_native_image(a, &affine),
    }
}

/// Builder for [`RandomAffine`].
#[derive(Debug, Clone)]
pub struct RandomAffineBuilder {
    scales: RangeArg,
    degrees: RangeArg,
    translation: RangeArg,
    image_interpolation: Interpolation,
    state: StateOptions,
}

impl Default for RandomAffineBuilder {
    fn default() -> Self {
        Self {
            scales: RangeArg::Sequence(vec![0.9, 1.1]),
            degrees: RangeArg::Scalar(10.0),
            translation: RangeArg::Scalar(0.0),
            image_interpolation: Interpolation::Trilinear,
            state: StateOptions::default(),
        }
    }
}

impl RandomAffineBuilder {
    /// Scaling factor range. A scalar `s` means `(1 - s, 1 + s)`.
    pub fn scales(mut self, scales: impl Into<RangeArg>) -> Self {
        self.scales = scales.into();
        self
    }

    /// Rotation range in degrees, shared by the three axes.
    pub fn degrees(mut self, degrees: impl Into<RangeArg>) -> Self {
        self.degrees = degrees.into();
        self
    }

    /// Translation range in millimetres, shared by the three axes.
    pub fn translation(mut self, translation: impl Into<RangeArg>) -> Self {
        self.translation = translation.into();
        self
    }

    /// Interpolation for intensity images.
    pub fn image_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.image_interpolation = interpolation;
        self
    }

    state_setters!();

    /// Validate the configuration.
    ///
    /// Fails with [`Error::InvalidArgument`] for out-of-range settings.
    #[must_use = "this returns the configured transform"]
    pub fn build(self) -> Result<RandomAffine> {
        let parsed = ensure_finite(parse_range(self.scales.clone(), "scales")?, "scales")?;
        let scales = match self.scales {
            RangeArg::Scalar(s) => (1.0 - s, 1.0 + s),
            RangeArg::Sequence(_) => parsed,
        };
        if scales.0 <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "scales must be positive, not {:?}",
                scales
            )));
        }
        Ok(RandomAffine {
            scales,
            degrees: ensure_finite(parse_degrees(self.degrees)?, "degrees")?,
            translation: ensure_finite(parse_translation(self.translation)?, "translation")?,
            image_interpolation: self.image_interpolation,
            state: self.state.build(),
        })
    }
}
