//! Spatial image with physical metadata in LPS coordinates.

use crate::error::{Error, Result};
use crate::nifti::{self, ArrayData, DataType, NiftiImage};
use std::path::Path;

/// Row/column 3×3 matrix.
pub type Matrix3 = [[f64; 3]; 3];

/// Flips RAS+ (NIfTI) coordinates to LPS+ and back.
const RAS_TO_LPS: [f64; 3] = [-1.0, -1.0, 1.0];

/// A volume positioned in physical space by origin, spacing and direction.
///
/// Physical coordinates follow the LPS+ convention used by ITK-style
/// toolkits: `p = origin + direction * diag(spacing) * index`.
#[derive(Debug, Clone)]
pub struct SpatialImage {
    data: ArrayData,
    origin: [f64; 3],
    spacing: [f64; 3],
    direction: Matrix3,
}

impl SpatialImage {
    /// Assemble an image from its parts.
    ///
    /// `data` must have one to three axes; missing trailing axes are added
    /// with length one.
    pub fn new(
        data: ArrayData,
        origin: [f64; 3],
        spacing: [f64; 3],
        direction: Matrix3,
    ) -> Result<Self> {
        let data = pad_to_3d(data)?;
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(Error::InvalidDimensions(format!(
                "spacing must be finite and > 0, got {:?}",
                spacing
            )));
        }
        invert3(&direction)?;
        Ok(Self {
            data,
            origin,
            spacing,
            direction,
        })
    }

    pub fn size(&self) -> [usize; 3] {
        let shape = self.data.shape();
        [shape[0], shape[1], shape[2]]
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn direction(&self) -> Matrix3 {
        self.direction
    }

    pub fn pixel_type(&self) -> DataType {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    /// `direction * diag(spacing)`, the linear part of index-to-physical.
    pub(crate) fn index_matrix(&self) -> Matrix3 {
        let mut m = self.direction;
        for row in &mut m {
            for (v, s) in row.iter_mut().zip(self.spacing) {
                *v *= s;
            }
        }
        m
    }

    /// Map a (continuous) voxel index to a physical LPS point.
    pub fn index_to_physical(&self, index: [f64; 3]) -> [f64; 3] {
        let offset = mat_vec(&self.index_matrix(), index);
        [
            self.origin[0] + offset[0],
            self.origin[1] + offset[1],
            self.origin[2] + offset[2],
        ]
    }

    /// Map a physical LPS point to a continuous voxel index.
    pub fn physical_to_index(&self, point: [f64; 3]) -> Result<[f64; 3]> {
        let inverse = invert3(&self.index_matrix())?;
        Ok(mat_vec(
            &inverse,
            [
                point[0] - self.origin[0],
                point[1] - self.origin[1],
                point[2] - self.origin[2],
            ],
        ))
    }

    /// Physical coordinates of the geometric centre of the voxel grid.
    pub fn physical_center(&self) -> [f64; 3] {
        let size = self.size();
        self.index_to_physical([
            (size[0] as f64 - 1.0) / 2.0,
            (size[1] as f64 - 1.0) / 2.0,
            (size[2] as f64 - 1.0) / 2.0,
        ])
    }
}

/// Read a NIfTI file into a [`SpatialImage`].
///
/// Spacing comes from `pixdim`, direction from the normalized columns of
/// the header affine (sform, else qform), origin from its translation; all
/// converted from RAS+ to LPS+. Only up to three spatial axes are supported.
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<SpatialImage> {
    from_nifti(nifti::load(path)?)
}

/// Build a [`SpatialImage`] from an in-memory NIfTI image.
fn from_nifti(image: NiftiImage) -> Result<SpatialImage> {
    if image.ndim() > 3 {
        return Err(Error::InvalidDimensions(format!(
            "spatial images support at most 3 axes, got {}",
            image.ndim()
        )));
    }

    let affine = image.affine();
    let pixdim = image.header().pixdim;
    let mut spacing = [1.0; 3];
    for (axis, s) in spacing.iter_mut().enumerate().take(image.ndim()) {
        *s = pixdim[axis + 1];
    }

    let mut direction = [[0.0; 3]; 3];
    for col in 0..3 {
        let norm = (0..3)
            .map(|row| affine[row][col] * affine[row][col])
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(Error::InvalidAffine(format!(
                "affine column {} has norm {}",
                col, norm
            )));
        }
        for row in 0..3 {
            direction[row][col] = RAS_TO_LPS[row] * affine[row][col] / norm;
        }
    }
    let origin = [
        RAS_TO_LPS[0] * affine[0][3],
        RAS_TO_LPS[1] * affine[1][3],
        RAS_TO_LPS[2] * affine[2][3],
    ];

    // Intensity scaling is folded into the pixel values, as file readers do.
    let header = image.header();
    let scaled = header.scl_slope != 0.0 && (header.scl_slope != 1.0 || header.scl_inter != 0.0);
    let data = if scaled {
        ArrayData::F64(image.to_f64())
    } else {
        image.into_data()
    };

    SpatialImage::new(data, origin, spacing, direction)
}

fn pad_to_3d(data: ArrayData) -> Result<ArrayData> {
    let ndim = data.shape().len();
    if ndim == 0 || ndim > 3 {
        return Err(Error::InvalidDimensions(format!(
            "spatial images need 1 to 3 axes, got {}",
            ndim
        )));
    }
    if ndim == 3 {
        return Ok(data);
    }

    macro_rules! pad {
        ($variant:ident, $a:expr) => {{
            let mut a = $a;
            while a.ndim() < 3 {
                let axis = ndarray::Axis(a.ndim());
                a = a.insert_axis(axis);
            }
            ArrayData::$variant(a)
        }};
    }

    Ok(match data {
        ArrayData::U8(a) => pad!(U8, a),
        ArrayData::I8(a) => pad!(I8, a),
        ArrayData::I16(a) => pad!(I16, a),
        ArrayData::U16(a) => pad!(U16, a),
        ArrayData::I32(a) => pad!(I32, a),
        ArrayData::U32(a) => pad!(U32, a),
        ArrayData::I64(a) => pad!(I64, a),
        ArrayData::U64(a) => pad!(U64, a),
        ArrayData::F32(a) => pad!(F32, a),
        ArrayData::F64(a) => pad!(F64, a),
    })
}

pub(crate) fn mat_vec(m: &Matrix3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

pub(crate) fn mat_mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Inverse by adjugate; fails for (near-)singular or non-finite matrices.
pub(crate) fn invert3(m: &Matrix3) -> Result<Matrix3> {
    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0];

    let c00 = cof(1, 2, 1, 2);
    let c01 = -cof(1, 2, 0, 2);
    let c02 = cof(1, 2, 0, 1);
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    if !det.is_finite() || det.abs() < 1e-12 {
        return Err(Error::InvalidAffine(format!(
            "matrix is singular (determinant {})",
            det
        )));
    }

    let adj = [
        [c00, -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
        [c01, cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
        [c02, -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
    ];
    let mut inv = [[0.0; 3]; 3];
    for (i, row) in inv.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = adj[i][j] / det;
        }
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nifti::Affine;
    use approx::assert_relative_eq;
    use ndarray::{ArrayD, IxDyn};
    use tempfile::tempdir;

    #[test]
    fn test_read_image_converts_ras_to_lps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ras.nii");
        let affine: Affine = [
            [1.5, 0.0, 0.0, -90.0],
            [0.0, 2.0, 0.0, 126.0],
            [0.0, 0.0, 3.0, -72.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let img = NiftiImage::from_array(ArrayD::<i16>::zeros(IxDyn(&[4, 5, 6])), affine);
        nifti::save(&img, &path).unwrap();

        let spatial = read_image(&path).unwrap();
        assert_eq!(spatial.size(), [4, 5, 6]);
        assert_eq!(spatial.spacing(), [1.5, 2.0, 3.0]);
        assert_eq!(spatial.origin(), [90.0, -126.0, -72.0]);
        assert_eq!(
            spatial.direction(),
            [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]]
        );
        assert_eq!(spatial.pixel_type(), DataType::Int16);
    }

    #[test]
    fn test_index_physical_roundtrip() {
        let data = ArrayData::F32(ArrayD::zeros(IxDyn(&[3, 3, 3])));
        let c = std::f64::consts::FRAC_1_SQRT_2;
        let direction = [[c, -c, 0.0], [c, c, 0.0], [0.0, 0.0, 1.0]];
        let image = SpatialImage::new(data, [1.0, 2.0, 3.0], [0.5, 2.0, 1.0], direction).unwrap();

        let point = image.index_to_physical([1.0, 2.0, 0.5]);
        let index = image.physical_to_index(point).unwrap();
        assert_relative_eq!(index[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(index[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(index[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_two_dimensional_input_is_padded() {
        let data = ArrayData::U8(ArrayD::zeros(IxDyn(&[7, 9])));
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let image = SpatialImage::new(data, [0.0; 3], [1.0; 3], identity).unwrap();
        assert_eq!(image.size(), [7, 9, 1]);
    }

    #[test]
    fn test_singular_direction_rejected() {
        let data = ArrayData::F32(ArrayD::zeros(IxDyn(&[2, 2, 2])));
        let singular = [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let result = SpatialImage::new(data, [0.0; 3], [1.0; 3], singular);
        assert!(matches!(result, Err(Error::InvalidAffine(_))));
    }

    #[test]
    fn test_invert3() {
        let m = [[2.0, 0.0, 1.0], [0.0, 3.0, 0.0], [1.0, 0.0, 1.0]];
        let inv = invert3(&m).unwrap();
        let product = mat_mul(&m, &inv);
        for (i, row) in product.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                assert_relative_eq!(v, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_four_dimensional_rejected() {
        let img = NiftiImage::from_array(
            ArrayD::<f32>::zeros(IxDyn(&[2, 2, 2, 3])),
            [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        );
        assert!(matches!(
            from_nifti(img),
            Err(Error::InvalidDimensions(_))
        ));
    }
}
