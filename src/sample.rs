//! A training sample: named images passed through transforms together.

use crate::nifti::NiftiImage;
use std::collections::BTreeMap;

/// How a transform should treat an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageKind {
    /// Continuous intensities (MRI, CT, ...).
    #[default]
    Intensity,
    /// Discrete labels; never interpolated or perturbed in value.
    Label,
}

/// One image in a [`Sample`].
#[derive(Debug, Clone)]
pub struct SampleImage {
    pub image: NiftiImage,
    pub kind: ImageKind,
}

impl SampleImage {
    /// Wrap an image holding continuous intensities.
    pub fn intensity(image: NiftiImage) -> Self {
        Self {
            image,
            kind: ImageKind::Intensity,
        }
    }

    /// Wrap a label map.
    pub fn label(image: NiftiImage) -> Self {
        Self {
            image,
            kind: ImageKind::Label,
        }
    }

    /// True for label maps.
    pub fn is_label(&self) -> bool {
        self.kind == ImageKind::Label
    }
}

/// Images keyed by name, iterated in name order so that random draws
/// consumed per image are assigned deterministically.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    images: BTreeMap<String, SampleImage>,
}

impl Sample {
    /// An empty sample.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let sample = Sample::new()
    ///     .with("t1", SampleImage::intensity(t1))
    ///     .with("seg", SampleImage::label(seg));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image, returning the one previously stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, image: SampleImage) -> Option<SampleImage> {
        self.images.insert(name.into(), image)
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use = "this method returns the extended sample"]
    pub fn with(mut self, name: impl Into<String>, image: SampleImage) -> Self {
        self.insert(name, image);
        self
    }

    /// The image stored under `name`.
    pub fn get(&self, name: &str) -> Option<&SampleImage> {
        self.images.get(name)
    }

    /// Take the image stored under `name` out of the sample.
    pub fn remove(&mut self, name: &str) -> Option<SampleImage> {
        self.images.remove(name)
    }

    /// Images in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SampleImage)> {
        self.images.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Images in name order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut SampleImage)> {
        self.images.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// True if the sample holds no images.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
