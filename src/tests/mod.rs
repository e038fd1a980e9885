pub mod test_target;

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::batch::{Batch, Observation};
use crate::config::{ConvStageConfig, InputShape, NetworkConfig};
use crate::device::Device;
use crate::network::ValueNetwork;

/// 26x26 is the smallest input the default kernels and strides accept
pub(crate) fn small_shape() -> InputShape {
    InputShape::new(2, 26, 26)
}

pub(crate) fn small_config(seed: u64) -> NetworkConfig {
    NetworkConfig {
        conv1: ConvStageConfig::new(4, 8, 2),
        conv2: ConvStageConfig::new(8, 4, 2),
        conv3: ConvStageConfig::new(8, 4, 1),
        hidden_units: 16,
        ..NetworkConfig::default()
    }
    .with_seed(seed)
}

pub(crate) fn small_network(actions: usize, seed: u64, device: Device) -> ValueNetwork {
    crate::logging::init_test_logging();
    ValueNetwork::new(small_shape(), actions, small_config(seed), device).unwrap()
}

pub(crate) fn random_observation(rng: &mut StdRng) -> Observation {
    let (frames, height, width) = small_shape().dims();
    Array3::from_shape_fn((frames, height, width), |_| rng.gen::<f32>())
}

pub(crate) fn random_batch(size: usize, actions: usize, seed: u64) -> Batch {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut batch = Batch::default();
    for i in 0..size {
        batch.states.push(random_observation(&mut rng));
        batch.next_states.push(random_observation(&mut rng));
        batch.actions.push(rng.gen_range(0..actions));
        batch.rewards.push(rng.gen_range(-1.0..1.0));
        batch.terminals.push(i % 3 == 0);
    }
    batch
}
