//! NIfTI-1 file reading and writing.
//!
//! Single-file images only (`.nii`, or `.nii.gz` when the path ends in
//! `.gz`). Header extensions are rejected rather than skipped.

use super::header::NiftiHeader;
use super::image::{ArrayData, NiftiImage};
use crate::error::{Error, Result};
use byteorder::{BigEndian, LittleEndian};
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const IO_BUFFER_SIZE: usize = 1024 * 1024;

fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

/// Read the whole file, transparently decompressing gzip.
fn read_all(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    if is_gzipped(path) {
        let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(IO_BUFFER_SIZE, file));
        decoder.read_to_end(&mut bytes)?;
    } else {
        BufReader::with_capacity(IO_BUFFER_SIZE, file).read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

fn ensure_no_extensions(bytes: &[u8], header: &NiftiHeader) -> Result<()> {
    let vox_offset = header.vox_offset as usize;
    if vox_offset >= NiftiHeader::SIZE + 4 && bytes.len() > NiftiHeader::SIZE {
        let extension_flag = bytes[NiftiHeader::SIZE];
        if extension_flag != 0 {
            return Err(Error::InvalidFileFormat(
                "NIfTI extensions are not supported".to_string(),
            ));
        }
    }
    Ok(())
}

/// Load a NIfTI image from file.
///
/// # Example
/// ```ignore
/// let img = voxaug::nifti::load("brain.nii.gz")?;
/// let data = img.to_f32();
/// ```
#[must_use = "this function returns a loaded image that should be used"]
pub fn load<P: AsRef<Path>>(path: P) -> Result<NiftiImage> {
    let path = path.as_ref();
    let bytes = read_all(path)?;

    let header = NiftiHeader::from_bytes(&bytes)?;
    ensure_no_extensions(&bytes, &header)?;

    let offset = header.vox_offset as usize;
    let payload = bytes.get(offset..).ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("file truncated before vox_offset {}", offset),
        ))
    })?;

    let shape = header.shape();
    let data = if header.is_little_endian() {
        ArrayData::from_bytes::<LittleEndian>(header.datatype, &shape, payload)?
    } else {
        ArrayData::from_bytes::<BigEndian>(header.datatype, &shape, payload)?
    };

    log::trace!("loaded {} ({:?}, {})", path.display(), shape, header.datatype);
    Ok(NiftiImage::from_parts(header, data))
}

/// Read only the header of a NIfTI file.
pub fn load_header<P: AsRef<Path>>(path: P) -> Result<NiftiHeader> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut bytes = vec![0u8; NiftiHeader::SIZE];
    if is_gzipped(path) {
        MultiGzDecoder::new(BufReader::new(file)).read_exact(&mut bytes)?;
    } else {
        BufReader::new(file).read_exact(&mut bytes)?;
    }
    NiftiHeader::from_bytes(&bytes)
}

/// Save a NIfTI image to file.
///
/// Format is determined by the extension: `.gz` is gzip-compressed,
/// anything else is written uncompressed.
///
/// # Example
/// ```ignore
/// voxaug::nifti::save(&img, "output.nii.gz")?;
/// ```
pub fn save<P: AsRef<Path>>(image: &NiftiImage, path: P) -> Result<()> {
    let mut header = image.header().clone();
    header.vox_offset = NiftiHeader::DEFAULT_VOX_OFFSET;
    header.validate()?;

    let path = path.as_ref();
    let file = File::create(path)?;
    let writer = BufWriter::with_capacity(IO_BUFFER_SIZE, file);

    if is_gzipped(path) {
        let mut encoder = GzEncoder::new(writer, Compression::fast());
        write_image(&mut encoder, &header, image)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        write_image(&mut writer, &header, image)?;
        writer.flush()?;
    }
    Ok(())
}

fn write_image<W: Write>(writer: &mut W, header: &NiftiHeader, image: &NiftiImage) -> Result<()> {
    writer.write_all(&header.to_bytes())?;
    // Four-byte extension flag (all zero) pads the header to vox_offset.
    let padding = header.vox_offset as usize - NiftiHeader::SIZE;
    writer.write_all(&vec![0u8; padding])?;
    writer.write_all(&image.data_to_bytes())?;
    Ok(())
}
