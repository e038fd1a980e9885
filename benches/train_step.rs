//! Forward pass and training step on the default architecture

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deepq::batch::Batch;
use deepq::config::{InputShape, NetworkConfig, TrainerConfig};
use deepq::device::Device;
use deepq::network::ValueNetwork;
use deepq::trainer::Trainer;
use ndarray::{Array3, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BATCH_SIZE: usize = 32;
const ACTIONS: usize = 4;

fn random_batch(rng: &mut StdRng, shape: InputShape) -> Batch {
    let mut observation = || Array3::from_shape_fn(shape.dims(), |_| rng.gen::<f32>());
    let states = (0..BATCH_SIZE).map(|_| observation()).collect();
    let next_states = (0..BATCH_SIZE).map(|_| observation()).collect();
    Batch::new(
        states,
        (0..BATCH_SIZE).map(|i| i % ACTIONS).collect(),
        next_states,
        vec![0.5; BATCH_SIZE],
        (0..BATCH_SIZE).map(|i| i % 8 == 0).collect(),
    )
}

fn bench_forward(c: &mut Criterion) {
    let shape = InputShape::default();
    for device in [Device::Cpu, Device::CpuParallel] {
        let network = ValueNetwork::new(shape, ACTIONS, NetworkConfig::default().with_seed(0), device).unwrap();
        let observations = Array4::from_elem((BATCH_SIZE, shape.frames, shape.height, shape.width), 0.5f32);
        c.bench_function(&format!("forward_{:?}", device), |b| {
            b.iter(|| network.forward(black_box(observations.view())).unwrap())
        });
    }
}

fn bench_train_step(c: &mut Criterion) {
    let shape = InputShape::default();
    let mut rng = StdRng::seed_from_u64(0);
    let batch = random_batch(&mut rng, shape);
    for device in [Device::Cpu, Device::CpuParallel] {
        let online = ValueNetwork::new(shape, ACTIONS, NetworkConfig::default().with_seed(1), device).unwrap();
        let target = online.clone();
        let mut trainer = Trainer::new(online, TrainerConfig::default()).unwrap();
        c.bench_function(&format!("train_step_{:?}", device), |b| {
            b.iter(|| trainer.train_step(black_box(&batch), &target).unwrap())
        });
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_forward, bench_train_step
}
criterion_main!(benches);
