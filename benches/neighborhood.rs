//! Neighborhood kernel throughput.
//!
//! Compares the unchecked interior path against the boundary-condition
//! shell. "interior" buffers the input one radius beyond the output so no
//! sample needs a boundary condition; "shell" buffers exactly the output
//! region; "strip" is a region thinner than the window, so every sample
//! goes through the boundary cursor.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndflow::prelude::*;

fn ramp(region: Region) -> Image {
    Image::from_fn(region, |index| index.iter().sum::<i64>() as f32).unwrap()
}

fn run(input: &Image, output_region: &Region, operator: &NeighborhoodOperator, mode: BoundaryMode) {
    let abort = AbortHandle::new();
    let mut output = Image::filled(output_region.clone(), 0.0).unwrap();
    let outcome = apply_kernel(input, &mut output, operator, &mode, &abort).unwrap();
    black_box((outcome, output.as_slice()[0]));
}

fn bench_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("mean_3x3");
    let side = 256usize;
    let output_region = Region::from_size(vec![side, side]);
    let operator = NeighborhoodOperator::mean(vec![1, 1]).unwrap();
    group.throughput(Throughput::Elements((side * side) as u64));

    let padded = ramp(output_region.padded_by(&[1, 1]));
    group.bench_function("interior", |b| {
        b.iter(|| run(&padded, &output_region, &operator, BoundaryMode::Nearest))
    });

    let exact = ramp(output_region.clone());
    for mode in [
        BoundaryMode::Constant(0.0),
        BoundaryMode::Nearest,
        BoundaryMode::Mirror,
        BoundaryMode::Periodic,
    ] {
        group.bench_with_input(BenchmarkId::new("shell", format!("{mode:?}")), &mode, |b, &mode| {
            b.iter(|| run(&exact, &output_region, &operator, mode))
        });
    }

    let strip_region = Region::from_size(vec![side * side / 2, 2]);
    let strip = ramp(strip_region.clone());
    group.bench_function("strip", |b| {
        b.iter(|| run(&strip, &strip_region, &operator, BoundaryMode::Mirror))
    });
    group.finish();
}

fn bench_gaussian(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian");
    let side = 128usize;
    let output_region = Region::from_size(vec![side, side]);
    let exact = ramp(output_region.clone());
    group.throughput(Throughput::Elements((side * side) as u64));

    for variance in [1.0, 4.0] {
        let operator = GaussianOperator::new(variance).operator(2).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(variance), &operator, |b, operator| {
            b.iter(|| run(&exact, &output_region, operator, BoundaryMode::Mirror))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mean, bench_gaussian);
criterion_main!(benches);
