//! Criterion benchmarks for the array/affine conversion and the transforms
//! built on it.
//!
//! Run with: cargo bench --bench conversion

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use voxaug::nifti::{self, NiftiImage};
use voxaug::{
    array_affine_to_native_image, Generator, RandomAffine, RandomNoise, RandomTransform, Sample,
    SampleImage,
};

const AFFINE: nifti::Affine = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

const SHAPES: [[usize; 3]; 3] = [[32, 32, 32], [64, 64, 64], [128, 128, 64]];

fn create_test_volume(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(shape).f(), |ix| ((ix[0] + ix[1] + ix[2]) % 256) as f32)
}

fn label(shape: &[usize]) -> String {
    format!("{}x{}x{}", shape[0], shape[1], shape[2])
}

/// Temp-file round trip from array to native image.
fn bench_array_affine_to_native(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_affine_to_native_image");

    for shape in &SHAPES {
        let volume = create_test_volume(shape);
        group.throughput(Throughput::Bytes((volume.len() * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label(shape)), &volume, |b, v| {
            b.iter(|| black_box(array_affine_to_native_image(black_box(v), &AFFINE).unwrap()))
        });
    }

    group.finish();
}

fn bench_random_noise(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_noise");
    let noise = RandomNoise::builder()
        .std(0.1)
        .generator(Generator::new(0))
        .build()
        .unwrap();

    for shape in &SHAPES {
        let image = NiftiImage::from_array(create_test_volume(shape), AFFINE);
        let sample = Sample::new().with("image", SampleImage::intensity(image));
        group.throughput(Throughput::Elements(shape.iter().product::<usize>() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label(shape)), &sample, |b, s| {
            b.iter(|| black_box(noise.invoke(s.clone()).unwrap()))
        });
    }

    group.finish();
}

fn bench_random_affine(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_affine");
    group.sample_size(10);
    let affine = RandomAffine::builder()
        .degrees(10.0)
        .translation(2.0)
        .generator(Generator::new(0))
        .build()
        .unwrap();

    for shape in &SHAPES[..2] {
        let image = NiftiImage::from_array(create_test_volume(shape), AFFINE);
        let sample = Sample::new().with("image", SampleImage::intensity(image));
        group.bench_with_input(BenchmarkId::from_parameter(label(shape)), &sample, |b, s| {
            b.iter(|| black_box(affine.invoke(s.clone()).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_array_affine_to_native,
    bench_random_noise,
    bench_random_affine
);
criterion_main!(benches);
