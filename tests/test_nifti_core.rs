//! Tests for NIfTI I/O as seen through the public API, including corrupt
//! and truncated files.

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use tempfile::NamedTempFile;
use voxaug::nifti::{self, ArrayData, DataType, NiftiImage};
use voxaug::Error;

const AFFINE: nifti::Affine = [
    [1.5, 0.0, 0.0, -20.0],
    [0.0, 1.5, 0.0, 30.0],
    [0.0, 0.0, 4.0, 5.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Build an image from C-ordered values stored in NIfTI (Fortran) layout.
fn create_test_image(data: Vec<f32>, shape: Vec<usize>) -> NiftiImage {
    let c_order = ArrayD::from_shape_vec(shape.clone(), data).unwrap();
    let mut f_order = ArrayD::zeros(IxDyn(&shape).f());
    f_order.assign(&c_order);
    NiftiImage::from_array(f_order, AFFINE)
}

fn saved(img: &NiftiImage) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    nifti::save(img, file.path()).unwrap();
    file
}

#[test]
fn test_load_invalid_magic_bytes() {
    let img = create_test_image(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2, 1]);
    let file = saved(&img);

    let mut bytes = std::fs::read(file.path()).unwrap();
    bytes[344..348].copy_from_slice(b"BAD!");
    std::fs::write(file.path(), bytes).unwrap();

    let err = nifti::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidMagic(_)));
    assert!(err.to_string().contains("invalid NIfTI magic"));
}

#[test]
fn test_load_unsupported_data_type() {
    let img = create_test_image(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2, 1]);
    let file = saved(&img);

    let mut bytes = std::fs::read(file.path()).unwrap();
    bytes[70..72].copy_from_slice(&9999i16.to_le_bytes());
    std::fs::write(file.path(), bytes).unwrap();

    let err = nifti::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedDataType(9999)));
}

#[test]
fn test_roundtrip_preserves_values_and_metadata() {
    let values: Vec<f32> = (1..=24).map(|v| v as f32).collect();
    let img = create_test_image(values, vec![2, 3, 4]);
    let file = saved(&img);
    let reloaded = nifti::load(file.path()).unwrap();

    assert_eq!(reloaded.to_f32(), img.to_f32());
    assert_eq!(reloaded.shape(), img.shape());
    assert_eq!(reloaded.dtype(), DataType::Float32);
    assert_eq!(reloaded.spacing(), vec![1.5, 1.5, 4.0]);
    assert_eq!(reloaded.affine(), AFFINE);
}

#[test]
fn test_gzip_roundtrip() {
    let data = ArrayD::from_shape_fn(IxDyn(&[10, 10, 10]).f(), |ix| (ix[0] * ix[1] + ix[2]) as i16);
    let img = NiftiImage::from_array(data.clone(), AFFINE);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.nii.gz");
    nifti::save(&img, &path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    let loaded = nifti::load(&path).unwrap();
    assert_eq!(loaded.data(), &ArrayData::I16(data));
    assert_eq!(nifti::load_header(&path).unwrap().shape(), vec![10, 10, 10]);
}

#[test]
fn test_minimal_volume() {
    let img = create_test_image(vec![1.0], vec![1, 1, 1]);
    let file = saved(&img);
    let loaded = nifti::load(file.path()).unwrap();

    assert_eq!(loaded.shape(), [1, 1, 1]);
    assert_eq!(loaded.to_f32().len(), 1);
}

#[test]
fn test_truncated_file() {
    let img = create_test_image(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2, 1]);
    let file = saved(&img);

    let bytes = std::fs::read(file.path()).unwrap();
    std::fs::write(file.path(), &bytes[..bytes.len() / 2]).unwrap();

    match nifti::load(file.path()) {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected truncated-file error, got {:?}", other),
    }
}

#[test]
fn test_integer_types_roundtrip() {
    let shape = IxDyn(&[2, 2, 1]);
    let images = [
        NiftiImage::from_array(ArrayD::from_shape_fn(shape.clone().f(), |ix| ix[0] as u16 + 1), AFFINE),
        NiftiImage::from_array(ArrayD::from_shape_fn(shape.clone().f(), |ix| -(ix[1] as i16)), AFFINE),
        NiftiImage::from_array(ArrayD::from_shape_fn(shape.f(), |ix| (ix[0] + ix[1]) as u8), AFFINE),
    ];

    for img in images {
        let file = saved(&img);
        let loaded = nifti::load(file.path()).unwrap();
        assert_eq!(loaded.dtype(), img.dtype());
        assert_eq!(loaded.shape(), [2, 2, 1]);
        assert_eq!(loaded.data(), img.data());
    }
}

#[test]
fn test_with_data_checks_shape() {
    let img = create_test_image(vec![0.0; 8], vec![2, 2, 2]);
    let err = img.with_data_f32(ArrayD::zeros(IxDyn(&[2, 2]))).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch(_)));

    let replaced = img.with_data(ArrayData::U8(ArrayD::zeros(IxDyn(&[2, 2, 2])))).unwrap();
    assert_eq!(replaced.dtype(), DataType::UInt8);
    assert_eq!(replaced.header().datatype, DataType::UInt8);
}
