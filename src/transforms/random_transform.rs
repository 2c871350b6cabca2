//! Shared plumbing for randomized transforms.
//!
//! Concrete augmentations embed a [`RandomState`] and implement
//! [`RandomTransform`]. Callers run them through
//! [`RandomTransform::invoke`], which reseeds the generator when a seed was
//! configured and then dispatches to [`Transform::call`].

use super::base::Transform;
use crate::error::{Error, Result};
use crate::nifti::{self, Affine, NiftiElement, NiftiImage};
use crate::random::Generator;
use crate::sample::Sample;
use crate::spatial::{self, SpatialImage};
use ndarray::{ArrayBase, Data, Dimension};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// Seed, verbosity and generator carried by every random transform.
#[derive(Debug, Clone)]
pub struct RandomState {
    seed: Option<u64>,
    verbose: bool,
    generator: Generator,
}

impl RandomState {
    /// No validation is performed; the process-wide generator is used.
    pub fn new(seed: Option<u64>, verbose: bool) -> Self {
        Self {
            seed,
            verbose,
            generator: Generator::global(),
        }
    }

    /// Draw from (and reseed) `generator` instead of the global one.
    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = generator;
        self
    }

    /// Seed applied before every invocation, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Whether calls log their timing.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Generator parameters are drawn from.
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Reset the generator to the configured seed, if any.
    pub fn check_seed(&self) {
        if let Some(seed) = self.seed {
            log::debug!("reseeding generator with {}", seed);
            self.generator.manual_seed(seed);
        }
    }
}

impl Default for RandomState {
    fn default() -> Self {
        Self::new(None, false)
    }
}

/// A transform whose behaviour depends on parameters drawn at call time.
pub trait RandomTransform: Transform {
    /// Parameters drawn for one call.
    type Params;

    fn random_state(&self) -> &RandomState;

    /// Draw this call's parameters.
    fn get_params(&self, rng: &mut ChaCha8Rng) -> Self::Params;

    /// Draw parameters from the transform's generator.
    fn sample_params(&self) -> Self::Params {
        self.random_state()
            .generator()
            .with_rng(|rng| self.get_params(rng))
    }

    /// Reseed if configured, then run the transform.
    ///
    /// Two invocations with the same seed and sample produce the same draws
    /// provided nothing else uses the generator in between.
    fn invoke(&self, sample: Sample) -> Result<Sample> {
        self.random_state().check_seed();
        self.call(sample)
    }
}

/// A range argument: either a single magnitude or an explicit `(min, max)`.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeArg {
    Scalar(f64),
    Sequence(Vec<f64>),
}

impl std::fmt::Display for RangeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{}", v),
            Self::Sequence(values) => write!(f, "{:?}", values),
        }
    }
}

impl From<f64> for RangeArg {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for RangeArg {
    fn from(value: f32) -> Self {
        Self::Scalar(f64::from(value))
    }
}

impl From<i32> for RangeArg {
    fn from(value: i32) -> Self {
        Self::Scalar(f64::from(value))
    }
}

impl From<(f64, f64)> for RangeArg {
    fn from((min, max): (f64, f64)) -> Self {
        Self::Sequence(vec![min, max])
    }
}

impl<const N: usize> From<[f64; N]> for RangeArg {
    fn from(values: [f64; N]) -> Self {
        Self::Sequence(values.to_vec())
    }
}

impl From<Vec<f64>> for RangeArg {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values)
    }
}

impl From<&[f64]> for RangeArg {
    fn from(values: &[f64]) -> Self {
        Self::Sequence(values.to_vec())
    }
}

/// Normalize a range argument to `(min, max)`.
///
/// A scalar `s` must be non-negative and yields `(-s, s)`. A sequence must
/// hold exactly two values with `min <= max` and is returned as given.
/// `name` is only used in error messages.
pub fn parse_range(value: impl Into<RangeArg>, name: &str) -> Result<(f64, f64)> {
    let value = value.into();
    match &value {
        RangeArg::Scalar(v) => {
            if v.is_nan() || *v < 0.0 {
                return Err(Error::InvalidArgument(format!(
                    "if {} is a single number, it must be non-negative, not {}",
                    name, value
                )));
            }
            Ok((-v, *v))
        }
        RangeArg::Sequence(values) => {
            let &[min, max] = values.as_slice() else {
                return Err(Error::InvalidArgument(format!(
                    "if {} is a sequence, it must be of len 2, not {}",
                    name, value
                )));
            };
            if min.is_nan() || max.is_nan() || min > max {
                return Err(Error::InvalidArgument(format!(
                    "if {} is a sequence, the second value must be equal or greater than the first, not {}",
                    name, value
                )));
            }
            Ok((min, max))
        }
    }
}

/// [`parse_range`] labelled `degrees`.
pub fn parse_degrees(degrees: impl Into<RangeArg>) -> Result<(f64, f64)> {
    parse_range(degrees, "degrees")
}

/// [`parse_range`] labelled `translation`.
pub fn parse_translation(translation: impl Into<RangeArg>) -> Result<(f64, f64)> {
    parse_range(translation, "translation")
}

/// Build a [`SpatialImage`] from an array and its voxel-to-RAS affine.
///
/// The pair is written to a uniquely named temporary `.nii` file in the
/// system temp directory and read back with [`spatial::read_image`]; the
/// file is removed before returning, on success and on error.
///
/// Orientation is not derived from `affine` here. The native image only
/// sees what survives the NIfTI-1 sform: single precision values, unit
/// direction columns and no shear.
///
/// # Example
///
/// ```ignore
/// let volume = Array3::<f32>::zeros((64, 64, 32));
/// let image = array_affine_to_native_image(&volume, &affine)?;
/// assert_eq!(image.size(), [64, 64, 32]);
/// ```
#[must_use = "this function returns the converted image"]
pub fn array_affine_to_native_image<A, S, D>(
    array: &ArrayBase<S, D>,
    affine: &Affine,
) -> Result<SpatialImage>
where
    A: NiftiElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    array_affine_to_native_image_in(std::env::temp_dir(), array, affine)
}

/// [`array_affine_to_native_image`] with the temporary file placed in `dir`.
#[must_use = "this function returns the converted image"]
pub fn array_affine_to_native_image_in<P, A, S, D>(
    dir: P,
    array: &ArrayBase<S, D>,
    affine: &Affine,
) -> Result<SpatialImage>
where
    P: AsRef<Path>,
    A: NiftiElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    let image = NiftiImage::from_array(array.view().into_dyn().to_owned(), *affine);

    let tmp = tempfile::Builder::new()
        .prefix("voxaug-")
        .suffix(".nii")
        .tempfile_in(dir)?;
    log::trace!("converting through {}", tmp.path().display());

    nifti::save(&image, tmp.path())?;
    let native = spatial::read_image(tmp.path())?;
    tmp.close()?;
    Ok(native)
}
