//! Benchmarks for vocabulary learning, descriptor descent and database queries.
//!
//! Images are synthetic: each is a set of random descriptors, so the numbers
//! measure cost, not recognition quality.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use vocabtree::distance::DistanceMetric;
use vocabtree::recognition::{ConfigImageRecognition, ImageRecognition, PrecomputedFeatures};

type Image = Vec<Vec<f32>>;

// === Synthetic Data Generation ===

fn random_images(n: usize, per_image: usize, dim: usize, seed: u64) -> Vec<Image> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            (0..per_image)
                .map(|_| (0..dim).map(|_| rng.random::<f32>()).collect())
                .collect()
        })
        .collect()
}

fn trained(images: &[Image], branch_factor: usize, levels: usize) -> ImageRecognition<[Vec<f32>], PrecomputedFeatures> {
    let config = ConfigImageRecognition::new(branch_factor, levels).with_seed(42);
    let dim = images[0][0].len();
    let mut rec = ImageRecognition::new(config, PrecomputedFeatures::new(dim).unwrap()).unwrap();
    rec.learn_description(images.iter().map(Vec::as_slice)).unwrap();
    rec
}

// === Benchmarks ===

fn bench_learn(c: &mut Criterion) {
    let mut group = c.benchmark_group("learn_description");
    group.sample_size(10);

    let dim = 32;

    for n in [20, 50, 100].iter() {
        let images = random_images(*n, 50, dim, 42);
        group.throughput(Throughput::Elements((*n * 50) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |bench, _| {
            bench.iter(|| trained(black_box(&images), 8, 3));
        });
    }

    group.finish();
}

fn bench_descent(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_leaf");

    let dim = 32;
    let images = random_images(100, 50, dim, 42);
    let queries = random_images(1, 1000, dim, 123).remove(0);

    for (bf, levels) in [(4, 4), (8, 3), (16, 2)].iter() {
        let rec = trained(&images, *bf, *levels);
        let tree = rec.tree().unwrap();
        group.throughput(Throughput::Elements(queries.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("shape", format!("{bf}x{levels}")),
            tree,
            |bench, tree| {
                bench.iter(|| {
                    queries
                        .iter()
                        .map(|q| tree.find_leaf(black_box(q), &DistanceMetric::L2).unwrap())
                        .collect::<Vec<_>>()
                });
            },
        );
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_best_match");

    let dim = 32;
    let images = random_images(200, 50, dim, 42);
    let queries = random_images(20, 50, dim, 123);

    for n_db in [50, 100, 200].iter() {
        let mut rec = trained(&images, 8, 3);
        for (i, image) in images.iter().take(*n_db).enumerate() {
            rec.add_to_database(i.to_string(), image).unwrap();
        }
        group.throughput(Throughput::Elements(queries.len() as u64));

        group.bench_with_input(BenchmarkId::new("database", n_db), n_db, |bench, _| {
            let mut matches = Vec::new();
            bench.iter(|| {
                for q in &queries {
                    rec.find_best_match(black_box(q), &mut matches).unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_learn, bench_descent, bench_query);
criterion_main!(benches);
