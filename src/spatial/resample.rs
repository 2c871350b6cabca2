//! Resampling a [`SpatialImage`] through a transform in physical space.

use super::image::{invert3, mat_mul, mat_vec, Matrix3, SpatialImage};
use crate::error::Result;
use ndarray::{Array3, ArrayD, ShapeBuilder, Zip};

/// Interpolation method for resampling operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Nearest neighbour. Use for label maps.
    Nearest,
    /// Trilinear interpolation.
    #[default]
    Trilinear,
}

/// Affine map of physical LPS points about a fixed centre:
/// `q = matrix * (p - center) + center + translation`.
///
/// As in ITK-style resampling, the transform maps points of the *output*
/// grid to the points of the *input* image that are sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalTransform {
    pub matrix: Matrix3,
    pub translation: [f64; 3],
    pub center: [f64; 3],
}

impl PhysicalTransform {
    pub fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
            center: [0.0; 3],
        }
    }

    /// Isotropic scaling followed by rotations about x, y and z (in that
    /// order, angles in degrees) and a translation, all about `center`.
    pub fn from_euler_degrees(
        scale: f64,
        degrees: [f64; 3],
        translation: [f64; 3],
        center: [f64; 3],
    ) -> Self {
        let [ax, ay, az] = degrees.map(f64::to_radians);
        let (sx, cx) = ax.sin_cos();
        let (sy, cy) = ay.sin_cos();
        let (sz, cz) = az.sin_cos();

        let rx = [[1.0, 0.0, 0.0], [0.0, cx, -sx], [0.0, sx, cx]];
        let ry = [[cy, 0.0, sy], [0.0, 1.0, 0.0], [-sy, 0.0, cy]];
        let rz = [[cz, -sz, 0.0], [sz, cz, 0.0], [0.0, 0.0, 1.0]];

        let mut matrix = mat_mul(&rz, &mat_mul(&ry, &rx));
        for row in &mut matrix {
            for v in row.iter_mut() {
                *v *= scale;
            }
        }

        Self {
            matrix,
            translation,
            center,
        }
    }

    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        let local = [
            point[0] - self.center[0],
            point[1] - self.center[1],
            point[2] - self.center[2],
        ];
        let moved = mat_vec(&self.matrix, local);
        [
            moved[0] + self.center[0] + self.translation[0],
            moved[1] + self.center[1] + self.translation[1],
            moved[2] + self.center[2] + self.translation[2],
        ]
    }
}

impl Default for PhysicalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SpatialImage {
    /// Resample onto this image's own grid through `transform`.
    ///
    /// Output voxels whose source point falls outside the image get
    /// `default_value`. The pixel type is preserved (integer types are
    /// rounded).
    ///
    /// # Arguments
    ///
    /// * `transform` - Maps output points to the input points sampled
    /// * `interpolation` - Nearest for labels, trilinear otherwise
    /// * `default_value` - Value for points outside the field of view
    #[must_use = "this method returns a new image and does not modify the original"]
    pub fn resample(
        &self,
        transform: &PhysicalTransform,
        interpolation: Interpolation,
        default_value: f64,
    ) -> Result<SpatialImage> {
        let index_matrix = self.index_matrix();
        let inverse = invert3(&index_matrix)?;
        let origin = self.origin();
        let size = self.size();
        let input = self.data().to_f64();

        let mut output = Array3::<f64>::zeros((size[0], size[1], size[2]).f());
        Zip::indexed(&mut output).par_for_each(|(i, j, k), out| {
            let index = [i as f64, j as f64, k as f64];
            let offset = mat_vec(&index_matrix, index);
            let point = [
                origin[0] + offset[0],
                origin[1] + offset[1],
                origin[2] + offset[2],
            ];
            let source = transform.apply(point);
            let continuous = mat_vec(
                &inverse,
                [
                    source[0] - origin[0],
                    source[1] - origin[1],
                    source[2] - origin[2],
                ],
            );
            *out = match interpolation {
                Interpolation::Nearest => sample_nearest(&input, size, continuous),
                Interpolation::Trilinear => sample_trilinear(&input, size, continuous),
            }
            .unwrap_or(default_value);
        });

        SpatialImage::new(
            self.data().from_f64_like(output.into_dyn()),
            origin,
            self.spacing(),
            self.direction(),
        )
    }
}

/// Tolerance for points that land a rounding error outside the grid.
const EDGE_EPSILON: f64 = 1e-6;

fn inside(size: [usize; 3], index: [f64; 3]) -> bool {
    (0..3).all(|a| index[a] >= -EDGE_EPSILON && index[a] <= size[a] as f64 - 1.0 + EDGE_EPSILON)
}

fn sample_nearest(input: &ArrayD<f64>, size: [usize; 3], index: [f64; 3]) -> Option<f64> {
    if !inside(size, index) {
        return None;
    }
    let ix = [0, 1, 2].map(|a| (index[a].round().max(0.0) as usize).min(size[a] - 1));
    Some(input[[ix[0], ix[1], ix[2]].as_slice()])
}

fn sample_trilinear(input: &ArrayD<f64>, size: [usize; 3], index: [f64; 3]) -> Option<f64> {
    if !inside(size, index) {
        return None;
    }
    let clamped = [0, 1, 2].map(|a| index[a].clamp(0.0, size[a] as f64 - 1.0));
    let lo = [0, 1, 2].map(|a| clamped[a].floor() as usize);
    let hi = [0, 1, 2].map(|a| (lo[a] + 1).min(size[a] - 1));
    let t = [0, 1, 2].map(|a| clamped[a] - lo[a] as f64);

    let mut value = 0.0;
    for corner in 0..8 {
        let mut weight = 1.0;
        let mut ix = [0usize; 3];
        for a in 0..3 {
            if corner & (1 << a) == 0 {
                ix[a] = lo[a];
                weight *= 1.0 - t[a];
            } else {
                ix[a] = hi[a];
                weight *= t[a];
            }
        }
        if weight != 0.0 {
            value += weight * input[ix.as_slice()];
        }
    }
    Some(value)
}
