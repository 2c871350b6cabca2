//! NIfTI-1 header parsing and serialization.
//!
//! Reads either byte order (detected from `sizeof_hdr`), always writes
//! little endian. Only the fields needed to place a volume in space are
//! modelled; everything else is zero on write.

use crate::error::{Error, Result};
use crate::nifti::Affine;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte offsets of the NIfTI-1 header fields we read or write.
mod offsets {
    pub const SIZEOF_HDR: usize = 0;
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const XYZT_UNITS: usize = 123;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN_B: usize = 256;
    pub const QOFFSET_X: usize = 268;
    pub const SROW_X: usize = 280;
    pub const SROW_Y: usize = 296;
    pub const SROW_Z: usize = 312;
    pub const MAGIC: usize = 344;
}

/// sform/qform code meaning "aligned to some anatomical template".
pub const XFORM_ALIGNED_ANAT: i16 = 2;

/// `NIfTI` data type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8 = 2,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Signed 32-bit integer
    Int32 = 8,
    /// 32-bit floating point
    Float32 = 16,
    /// 64-bit floating point
    Float64 = 64,
    /// Signed 8-bit integer
    Int8 = 256,
    /// Unsigned 16-bit integer
    UInt16 = 512,
    /// Unsigned 32-bit integer
    UInt32 = 768,
    /// Signed 64-bit integer
    Int64 = 1024,
    /// Unsigned 64-bit integer
    UInt64 = 1280,
}

impl DataType {
    /// Parse from a `NIfTI` datatype code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            256 => Ok(Self::Int8),
            512 => Ok(Self::UInt16),
            768 => Ok(Self::UInt32),
            1024 => Ok(Self::Int64),
            1280 => Ok(Self::UInt64),
            _ => Err(Error::UnsupportedDataType(code)),
        }
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Spatial units for voxel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialUnits {
    #[default]
    /// Units are not specified.
    Unknown,
    /// Voxel dimensions expressed in meters.
    Meter,
    /// Voxel dimensions expressed in millimeters.
    Millimeter,
    /// Voxel dimensions expressed in micrometers.
    Micrometer,
}

impl SpatialUnits {
    fn from_code(code: u8) -> Self {
        match code & 0x07 {
            1 => Self::Meter,
            2 => Self::Millimeter,
            3 => Self::Micrometer,
            _ => Self::Unknown,
        }
    }

    fn to_code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Meter => 1,
            Self::Millimeter => 2,
            Self::Micrometer => 3,
        }
    }
}

/// NIfTI-1 header.
///
/// Values are widened to `f64`/`i64` in memory and narrowed back to the
/// on-disk `f32`/`i16` fields on write.
#[derive(Debug, Clone)]
pub struct NiftiHeader {
    /// Number of dimensions (1-7).
    pub ndim: u8,
    /// Size along each dimension.
    pub dim: [i64; 7],
    /// Data type.
    pub datatype: DataType,
    /// qfac at index 0, voxel sizes at `1..=ndim`.
    pub pixdim: [f64; 8],
    /// Byte offset of the voxel data.
    pub vox_offset: i64,
    /// Data scaling slope (0 means "no scaling").
    pub scl_slope: f64,
    /// Data scaling intercept.
    pub scl_inter: f64,
    /// Spatial units.
    pub spatial_units: SpatialUnits,
    /// Description string (79 bytes max on disk).
    pub descrip: String,
    /// Auxiliary filename (23 bytes max on disk).
    pub aux_file: String,
    pub qform_code: i16,
    pub sform_code: i16,
    /// Quaternion parameters b, c, d of the qform.
    pub quatern: [f64; 3],
    /// Translation of the qform.
    pub qoffset: [f64; 3],
    /// First row of the sform affine.
    pub srow_x: [f64; 4],
    /// Second row of the sform affine.
    pub srow_y: [f64; 4],
    /// Third row of the sform affine.
    pub srow_z: [f64; 4],
    pub(crate) little_endian: bool,
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            ndim: 3,
            dim: [1; 7],
            datatype: DataType::Float32,
            pixdim: [1.0; 8],
            vox_offset: 352,
            scl_slope: 1.0,
            scl_inter: 0.0,
            spatial_units: SpatialUnits::Millimeter,
            descrip: String::new(),
            aux_file: String::new(),
            qform_code: 0,
            sform_code: XFORM_ALIGNED_ANAT,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            srow_x: [1.0, 0.0, 0.0, 0.0],
            srow_y: [0.0, 1.0, 0.0, 0.0],
            srow_z: [0.0, 0.0, 1.0, 0.0],
            little_endian: true,
        }
    }
}

impl NiftiHeader {
    /// Size of the NIfTI-1 header in bytes.
    pub const SIZE: usize = 348;

    /// Offset of voxel data in single-file `.nii` images written by this crate.
    pub const DEFAULT_VOX_OFFSET: i64 = 352;

    /// Read a header from bytes, detecting byte order from `sizeof_hdr`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "header too short: got {} bytes, need {}",
                    bytes.len(),
                    Self::SIZE
                ),
            )));
        }

        if LittleEndian::read_i32(&bytes[0..4]) == Self::SIZE as i32 {
            Self::parse::<LittleEndian>(bytes, true)
        } else if BigEndian::read_i32(&bytes[0..4]) == Self::SIZE as i32 {
            Self::parse::<BigEndian>(bytes, false)
        } else {
            Err(Error::InvalidMagic([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets::*;

        let magic = &bytes[MAGIC..MAGIC + 4];
        if magic != b"n+1\0" && magic != b"ni1\0" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }
        if magic == b"ni1\0" {
            return Err(Error::InvalidFileFormat(
                "two-file (.hdr/.img) NIfTI pairs are not supported".into(),
            ));
        }

        let ndim_raw = E::read_i16(&bytes[DIM..DIM + 2]);
        if !(1..=7).contains(&ndim_raw) {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {}",
                ndim_raw
            )));
        }

        let mut dim = [1i64; 7];
        for (i, d) in dim.iter_mut().enumerate() {
            let offset = DIM + 2 + i * 2;
            let raw = E::read_i16(&bytes[offset..offset + 2]);
            if raw < 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {} has negative value: {}",
                    i, raw
                )));
            }
            *d = i64::from(raw);
        }

        let datatype = DataType::from_code(E::read_i16(&bytes[DATATYPE..DATATYPE + 2]))?;
        let bitpix = E::read_i16(&bytes[BITPIX..BITPIX + 2]);
        let expected_bitpix = (datatype.byte_size() * 8) as i16;
        if bitpix != expected_bitpix {
            return Err(Error::InvalidDimensions(format!(
                "bitpix {} does not match datatype {} (expected {})",
                bitpix, datatype, expected_bitpix
            )));
        }

        let mut pixdim = [0.0f64; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            let offset = PIXDIM + i * 4;
            *p = f64::from(E::read_f32(&bytes[offset..offset + 4]));
        }

        let vox_offset = E::read_f32(&bytes[VOX_OFFSET..VOX_OFFSET + 4]);
        if !vox_offset.is_finite() || vox_offset.fract() != 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset must be a finite integer, got {}",
                vox_offset
            )));
        }

        let read_f32x4 = |start: usize| -> [f64; 4] {
            let mut row = [0.0; 4];
            for (i, v) in row.iter_mut().enumerate() {
                let offset = start + i * 4;
                *v = f64::from(E::read_f32(&bytes[offset..offset + 4]));
            }
            row
        };
        let quatern = read_f32x4(QUATERN_B);
        let qoffset = read_f32x4(QOFFSET_X);

        let header = Self {
            ndim: ndim_raw as u8,
            dim,
            datatype,
            pixdim,
            vox_offset: vox_offset as i64,
            scl_slope: f64::from(E::read_f32(&bytes[SCL_SLOPE..SCL_SLOPE + 4])),
            scl_inter: f64::from(E::read_f32(&bytes[SCL_INTER..SCL_INTER + 4])),
            spatial_units: SpatialUnits::from_code(bytes[XYZT_UNITS]),
            descrip: read_string(&bytes[DESCRIP..AUX_FILE]),
            aux_file: read_string(&bytes[AUX_FILE..QFORM_CODE]),
            qform_code: E::read_i16(&bytes[QFORM_CODE..QFORM_CODE + 2]),
            sform_code: E::read_i16(&bytes[SFORM_CODE..SFORM_CODE + 2]),
            quatern: [quatern[0], quatern[1], quatern[2]],
            qoffset: [qoffset[0], qoffset[1], qoffset[2]],
            srow_x: read_f32x4(SROW_X),
            srow_y: read_f32x4(SROW_Y),
            srow_z: read_f32x4(SROW_Z),
            little_endian,
        };

        header.validate()?;
        Ok(header)
    }

    /// Serialize to a 348-byte little-endian NIfTI-1 header.
    #[allow(clippy::wildcard_imports)]
    pub fn to_bytes(&self) -> Vec<u8> {
        use offsets::*;

        let mut buf = vec![0u8; Self::SIZE];
        LittleEndian::write_i32(&mut buf[SIZEOF_HDR..SIZEOF_HDR + 4], Self::SIZE as i32);

        LittleEndian::write_i16(&mut buf[DIM..DIM + 2], i16::from(self.ndim));
        for (i, &d) in self.dim.iter().enumerate() {
            let offset = DIM + 2 + i * 2;
            LittleEndian::write_i16(&mut buf[offset..offset + 2], d as i16);
        }

        LittleEndian::write_i16(&mut buf[DATATYPE..DATATYPE + 2], self.datatype as i16);
        LittleEndian::write_i16(
            &mut buf[BITPIX..BITPIX + 2],
            (self.datatype.byte_size() * 8) as i16,
        );

        for (i, &p) in self.pixdim.iter().enumerate() {
            let offset = PIXDIM + i * 4;
            LittleEndian::write_f32(&mut buf[offset..offset + 4], p as f32);
        }

        LittleEndian::write_f32(&mut buf[VOX_OFFSET..VOX_OFFSET + 4], self.vox_offset as f32);
        LittleEndian::write_f32(&mut buf[SCL_SLOPE..SCL_SLOPE + 4], self.scl_slope as f32);
        LittleEndian::write_f32(&mut buf[SCL_INTER..SCL_INTER + 4], self.scl_inter as f32);
        buf[XYZT_UNITS] = self.spatial_units.to_code();

        write_string(&mut buf[DESCRIP..AUX_FILE], &self.descrip);
        write_string(&mut buf[AUX_FILE..QFORM_CODE], &self.aux_file);

        LittleEndian::write_i16(&mut buf[QFORM_CODE..QFORM_CODE + 2], self.qform_code);
        LittleEndian::write_i16(&mut buf[SFORM_CODE..SFORM_CODE + 2], self.sform_code);

        for (i, &q) in self.quatern.iter().chain(self.qoffset.iter()).enumerate() {
            let offset = QUATERN_B + i * 4;
            LittleEndian::write_f32(&mut buf[offset..offset + 4], q as f32);
        }

        for (start, row) in [(SROW_X, &self.srow_x), (SROW_Y, &self.srow_y), (SROW_Z, &self.srow_z)]
        {
            for (i, &v) in row.iter().enumerate() {
                let offset = start + i * 4;
                LittleEndian::write_f32(&mut buf[offset..offset + 4], v as f32);
            }
        }

        buf[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");
        buf
    }

    /// The voxel-to-world affine: sform if set, else qform, else pixdim scaling.
    pub fn affine(&self) -> Affine {
        if self.sform_code > 0 {
            [self.srow_x, self.srow_y, self.srow_z, [0.0, 0.0, 0.0, 1.0]]
        } else if self.qform_code > 0 {
            self.qform_to_affine()
        } else {
            [
                [self.pixdim[1], 0.0, 0.0, 0.0],
                [0.0, self.pixdim[2], 0.0, 0.0],
                [0.0, 0.0, self.pixdim[3], 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    /// Store `affine` as an aligned sform and derive pixdim from its column norms.
    ///
    /// The qform is cleared: a quaternion cannot represent shear or
    /// reflection-free decompositions of arbitrary matrices.
    pub fn set_affine(&mut self, affine: &Affine) {
        self.srow_x = affine[0];
        self.srow_y = affine[1];
        self.srow_z = affine[2];
        self.sform_code = XFORM_ALIGNED_ANAT;
        self.qform_code = 0;
        self.quatern = [0.0; 3];
        self.qoffset = [0.0; 3];

        for col in 0..3 {
            let norm = (0..3)
                .map(|row| affine[row][col] * affine[row][col])
                .sum::<f64>()
                .sqrt();
            self.pixdim[col + 1] = norm;
        }
    }

    #[allow(clippy::many_single_char_names)]
    fn qform_to_affine(&self) -> Affine {
        let [b, c, d] = self.quatern;
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();

        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let [i, j, k] = [
            self.pixdim[1].abs(),
            self.pixdim[2].abs(),
            self.pixdim[3].abs() * qfac,
        ];

        [
            [
                (a * a + b * b - c * c - d * d) * i,
                2.0 * (b * c - a * d) * j,
                2.0 * (b * d + a * c) * k,
                self.qoffset[0],
            ],
            [
                2.0 * (b * c + a * d) * i,
                (a * a - b * b + c * c - d * d) * j,
                2.0 * (c * d - a * b) * k,
                self.qoffset[1],
            ],
            [
                2.0 * (b * d - a * c) * i,
                2.0 * (c * d + a * b) * j,
                (a * a - b * b - c * c + d * d) * k,
                self.qoffset[2],
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Image shape (the first `ndim` entries of `dim`).
    pub fn shape(&self) -> Vec<usize> {
        self.dim[..self.ndim as usize]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    /// Voxel spacing along each of the `ndim` axes.
    pub fn spacing(&self) -> Vec<f64> {
        let end = (self.ndim as usize + 1).min(self.pixdim.len());
        self.pixdim[1..end].to_vec()
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Size of the voxel payload in bytes.
    pub fn data_size(&self) -> usize {
        self.num_voxels() * self.datatype.byte_size()
    }

    /// True if the file this header came from is little endian.
    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Check the invariants a readable/writable NIfTI-1 header must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.ndim == 0 || self.ndim > 7 {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {}",
                self.ndim
            )));
        }

        for i in 0..self.ndim as usize {
            let d = self.dim[i];
            if d <= 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {} must be positive, got {}",
                    i, d
                )));
            }
            if d > i64::from(i16::MAX) {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {} is {} but NIfTI-1 allows at most {}",
                    i,
                    d,
                    i16::MAX
                )));
            }
            let spacing = self.pixdim[i + 1];
            if !spacing.is_finite() || spacing <= 0.0 {
                return Err(Error::InvalidDimensions(format!(
                    "pixdim[{}] must be finite and > 0, got {}",
                    i + 1,
                    spacing
                )));
            }
        }

        if self.vox_offset < Self::SIZE as i64 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset {} before header end ({})",
                self.vox_offset,
                Self::SIZE
            )));
        }

        let mut voxels: usize = 1;
        for &d in &self.dim[..self.ndim as usize] {
            voxels = voxels
                .checked_mul(d as usize)
                .ok_or_else(|| Error::InvalidDimensions("dimension product overflow".into()))?;
        }
        voxels
            .checked_mul(self.datatype.byte_size())
            .ok_or_else(|| Error::InvalidDimensions("data size overflow".into()))?;

        Ok(())
    }
}

fn read_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// Copy `value` into a fixed-width NUL-terminated field, truncating if needed.
fn write_string(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
}
