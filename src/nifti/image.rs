//! In-memory NIfTI image: header plus a typed voxel array.

use super::header::{DataType, NiftiHeader};
use super::Affine;
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

/// Element types that can be stored in a NIfTI file.
pub trait NiftiElement: Copy + Send + Sync + 'static {
    /// Datatype code written to the header.
    const DATA_TYPE: DataType;

    /// Wrap an owned array in the matching [`ArrayData`] variant.
    fn into_array_data(array: ArrayD<Self>) -> ArrayData;
}

macro_rules! impl_nifti_element {
    ($ty:ty, $dtype:ident, $variant:ident) => {
        impl NiftiElement for $ty {
            const DATA_TYPE: DataType = DataType::$dtype;

            fn into_array_data(array: ArrayD<Self>) -> ArrayData {
                ArrayData::$variant(array)
            }
        }
    };
}

impl_nifti_element!(u8, UInt8, U8);
impl_nifti_element!(i8, Int8, I8);
impl_nifti_element!(i16, Int16, I16);
impl_nifti_element!(u16, UInt16, U16);
impl_nifti_element!(i32, Int32, I32);
impl_nifti_element!(u32, UInt32, U32);
impl_nifti_element!(i64, Int64, I64);
impl_nifti_element!(u64, UInt64, U64);
impl_nifti_element!(f32, Float32, F32);
impl_nifti_element!(f64, Float64, F64);

/// Voxel payload, one variant per supported datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    U16(ArrayD<u16>),
    I32(ArrayD<i32>),
    U32(ArrayD<u32>),
    I64(ArrayD<i64>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Apply the same expression to whichever typed array is inside.
macro_rules! dispatch {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ArrayData::U8($arr) => $body,
            ArrayData::I8($arr) => $body,
            ArrayData::I16($arr) => $body,
            ArrayData::U16($arr) => $body,
            ArrayData::I32($arr) => $body,
            ArrayData::U32($arr) => $body,
            ArrayData::I64($arr) => $body,
            ArrayData::U64($arr) => $body,
            ArrayData::F32($arr) => $body,
            ArrayData::F64($arr) => $body,
        }
    };
}

impl ArrayData {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::U8(_) => DataType::UInt8,
            Self::I8(_) => DataType::Int8,
            Self::I16(_) => DataType::Int16,
            Self::U16(_) => DataType::UInt16,
            Self::I32(_) => DataType::Int32,
            Self::U32(_) => DataType::UInt32,
            Self::I64(_) => DataType::Int64,
            Self::U64(_) => DataType::UInt64,
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    /// Convert every voxel to `f32` (no intensity scaling applied).
    pub fn to_f32(&self) -> ArrayD<f32> {
        dispatch!(self, a => a.mapv(|v| v as f32))
    }

    /// Convert every voxel to `f64` (no intensity scaling applied).
    pub fn to_f64(&self) -> ArrayD<f64> {
        dispatch!(self, a => a.mapv(|v| v as f64))
    }

    /// Build a same-typed array from `f64` values, rounding and saturating
    /// for integer types.
    pub fn from_f64_like(&self, values: ArrayD<f64>) -> Self {
        match self {
            Self::U8(_) => Self::U8(values.mapv(|v| v.round() as u8)),
            Self::I8(_) => Self::I8(values.mapv(|v| v.round() as i8)),
            Self::I16(_) => Self::I16(values.mapv(|v| v.round() as i16)),
            Self::U16(_) => Self::U16(values.mapv(|v| v.round() as u16)),
            Self::I32(_) => Self::I32(values.mapv(|v| v.round() as i32)),
            Self::U32(_) => Self::U32(values.mapv(|v| v.round() as u32)),
            Self::I64(_) => Self::I64(values.mapv(|v| v.round() as i64)),
            Self::U64(_) => Self::U64(values.mapv(|v| v.round() as u64)),
            Self::F32(_) => Self::F32(values.mapv(|v| v as f32)),
            Self::F64(_) => Self::F64(values),
        }
    }

    /// Reverse the order of elements along `axis`.
    pub fn invert_axis(&mut self, axis: usize) {
        dispatch!(self, a => a.invert_axis(ndarray::Axis(axis)))
    }

    /// Serialize voxels in NIfTI (Fortran) order as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let size = self.dtype().byte_size();
        let len = self.shape().iter().product::<usize>();
        let mut out = vec![0u8; len * size];

        macro_rules! write_le {
            ($arr:expr, |$chunk:ident, $v:ident| $write:expr) => {
                // Iterating the transposed view in logical order visits the
                // original array in Fortran order.
                for ($chunk, &$v) in out.chunks_exact_mut(size).zip($arr.t().iter()) {
                    $write;
                }
            };
        }

        match self {
            Self::U8(a) => write_le!(a, |c, v| c[0] = v),
            Self::I8(a) => write_le!(a, |c, v| c[0] = v as u8),
            Self::I16(a) => write_le!(a, |c, v| LittleEndian::write_i16(c, v)),
            Self::U16(a) => write_le!(a, |c, v| LittleEndian::write_u16(c, v)),
            Self::I32(a) => write_le!(a, |c, v| LittleEndian::write_i32(c, v)),
            Self::U32(a) => write_le!(a, |c, v| LittleEndian::write_u32(c, v)),
            Self::I64(a) => write_le!(a, |c, v| LittleEndian::write_i64(c, v)),
            Self::U64(a) => write_le!(a, |c, v| LittleEndian::write_u64(c, v)),
            Self::F32(a) => write_le!(a, |c, v| LittleEndian::write_f32(c, v)),
            Self::F64(a) => write_le!(a, |c, v| LittleEndian::write_f64(c, v)),
        }
        out
    }

    /// Decode voxels stored in Fortran order with the given byte order.
    pub fn from_bytes<E: ByteOrder>(dtype: DataType, shape: &[usize], bytes: &[u8]) -> Result<Self> {
        let len = shape.iter().product::<usize>();
        let size = dtype.byte_size();
        if bytes.len() < len * size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "voxel data truncated: got {} bytes, need {}",
                    bytes.len(),
                    len * size
                ),
            )));
        }
        let bytes = &bytes[..len * size];

        macro_rules! decode {
            ($variant:ident, |$c:ident| $read:expr) => {{
                let values: Vec<_> = bytes.chunks_exact(size).map(|$c| $read).collect();
                let array = ArrayD::from_shape_vec(IxDyn(shape).f(), values)
                    .map_err(|e| Error::ShapeMismatch(e.to_string()))?;
                Self::$variant(array)
            }};
        }

        Ok(match dtype {
            DataType::UInt8 => decode!(U8, |c| c[0]),
            DataType::Int8 => decode!(I8, |c| c[0] as i8),
            DataType::Int16 => decode!(I16, |c| E::read_i16(c)),
            DataType::UInt16 => decode!(U16, |c| E::read_u16(c)),
            DataType::Int32 => decode!(I32, |c| E::read_i32(c)),
            DataType::UInt32 => decode!(U32, |c| E::read_u32(c)),
            DataType::Int64 => decode!(I64, |c| E::read_i64(c)),
            DataType::UInt64 => decode!(U64, |c| E::read_u64(c)),
            DataType::Float32 => decode!(F32, |c| E::read_f32(c)),
            DataType::Float64 => decode!(F64, |c| E::read_f64(c)),
        })
    }
}

/// A NIfTI volume held in memory.
#[derive(Debug, Clone)]
pub struct NiftiImage {
    header: NiftiHeader,
    data: ArrayData,
}

impl NiftiImage {
    /// Build an image from an array and a voxel-to-world affine.
    ///
    /// Shape, datatype and pixdim are derived from the inputs; the affine is
    /// stored as an aligned sform.
    pub fn from_array<T: NiftiElement>(array: ArrayD<T>, affine: Affine) -> Self {
        let mut header = NiftiHeader::default();
        header.datatype = T::DATA_TYPE;
        set_shape(&mut header, array.shape());
        header.set_affine(&affine);
        Self {
            header,
            data: T::into_array_data(array),
        }
    }

    /// Assemble an image from an existing header and payload.
    ///
    /// The header's shape and datatype are updated to match `data`.
    pub fn from_parts(mut header: NiftiHeader, data: ArrayData) -> Self {
        header.datatype = data.dtype();
        set_shape(&mut header, data.shape());
        Self { header, data }
    }

    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn spacing(&self) -> Vec<f64> {
        self.header.spacing()
    }

    pub fn affine(&self) -> Affine {
        self.header.affine()
    }

    /// Voxel values as `f32` with the header's `scl_slope`/`scl_inter` applied.
    pub fn to_f32(&self) -> ArrayD<f32> {
        let (slope, inter) = self.scaling();
        let mut out = self.data.to_f32();
        if let Some((slope, inter)) = slope.zip(inter) {
            out.mapv_inplace(|v| v * slope as f32 + inter as f32);
        }
        out
    }

    /// Voxel values as `f64` with intensity scaling applied.
    pub fn to_f64(&self) -> ArrayD<f64> {
        let (slope, inter) = self.scaling();
        let mut out = self.data.to_f64();
        if let Some((slope, inter)) = slope.zip(inter) {
            out.mapv_inplace(|v| v * slope + inter);
        }
        out
    }

    /// Replace the payload with `f32` values, keeping spatial metadata.
    pub fn with_data_f32(&self, data: ArrayD<f32>) -> Result<Self> {
        if data.shape() != self.shape() {
            return Err(Error::ShapeMismatch(format!(
                "expected {:?}, got {:?}",
                self.shape(),
                data.shape()
            )));
        }
        let mut header = self.header.clone();
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        Ok(Self::from_parts(header, ArrayData::F32(data)))
    }

    /// Replace the payload with any typed array of the same shape.
    pub fn with_data(&self, data: ArrayData) -> Result<Self> {
        if data.shape() != self.shape() {
            return Err(Error::ShapeMismatch(format!(
                "expected {:?}, got {:?}",
                self.shape(),
                data.shape()
            )));
        }
        Ok(Self::from_parts(self.header.clone(), data))
    }

    /// Voxel payload encoded as on-disk little-endian bytes.
    pub fn data_to_bytes(&self) -> Vec<u8> {
        self.data.to_le_bytes()
    }

    /// Non-identity scaling, if the header requests it.
    fn scaling(&self) -> (Option<f64>, Option<f64>) {
        let slope = self.header.scl_slope;
        let inter = self.header.scl_inter;
        if slope == 0.0 || (slope == 1.0 && inter == 0.0) {
            (None, None)
        } else {
            (Some(slope), Some(inter))
        }
    }
}

fn set_shape(header: &mut NiftiHeader, shape: &[usize]) {
    header.ndim = shape.len() as u8;
    header.dim = [1; 7];
    for (d, &s) in header.dim.iter_mut().zip(shape) {
        *d = s as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::BigEndian;
    use ndarray::ArrayD;

    const IDENTITY: Affine = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    #[test]
    fn test_from_array_sets_header() {
        let array = ArrayD::<i16>::zeros(IxDyn(&[4, 5, 6]));
        let img = NiftiImage::from_array(array, IDENTITY);
        assert_eq!(img.dtype(), DataType::Int16);
        assert_eq!(img.header().shape(), vec![4, 5, 6]);
        assert_eq!(img.ndim(), 3);
    }

    #[test]
    fn test_bytes_are_fortran_ordered() {
        // C-order [[0, 1, 2], [3, 4, 5]] is [0, 3, 1, 4, 2, 5] in F order.
        let array = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0u8, 1, 2, 3, 4, 5]).unwrap();
        let data = ArrayData::U8(array.clone());
        assert_eq!(data.to_le_bytes(), vec![0, 3, 1, 4, 2, 5]);

        let decoded =
            ArrayData::from_bytes::<LittleEndian>(DataType::UInt8, &[2, 3], &data.to_le_bytes())
                .unwrap();
        assert_eq!(decoded, ArrayData::U8(array));
    }

    #[test]
    fn test_from_bytes_big_endian() {
        let bytes = [0x00, 0x01, 0x00, 0x02];
        let decoded = ArrayData::from_bytes::<BigEndian>(DataType::Int16, &[2], &bytes).unwrap();
        assert_eq!(decoded.to_f64().into_raw_vec_and_offset().0, vec![1.0, 2.0]);
    }

    #[test]
    fn test_from_bytes_truncated() {
        let result = ArrayData::from_bytes::<LittleEndian>(DataType::Float32, &[4], &[0u8; 8]);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_intensity_scaling_applied() {
        let array = ArrayD::from_shape_vec(IxDyn(&[2]), vec![1i16, 2]).unwrap();
        let img = NiftiImage::from_array(array, IDENTITY);
        let mut header = img.header().clone();
        header.scl_slope = 2.0;
        header.scl_inter = 10.0;
        let scaled = NiftiImage::from_parts(header, img.into_data());
        assert_eq!(scaled.to_f32().into_raw_vec_and_offset().0, vec![12.0, 14.0]);
    }

    #[test]
    fn test_with_data_shape_mismatch() {
        let img = NiftiImage::from_array(ArrayD::<f32>::zeros(IxDyn(&[2, 2, 2])), IDENTITY);
        let result = img.with_data_f32(ArrayD::zeros(IxDyn(&[2, 2])));
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }
}
