use ndarray::{Array2, ArrayView4};

use crate::config::InputShape;
use crate::device::Device;
use crate::error::Result;

/// Anything that maps a batch of observations to a batch of action values.
///
/// The online and the target network are two instances of this capability.
/// Prediction takes `&self`, so a predictor can be shared read-only while
/// nobody holds it mutably.
pub trait ActionValuePredictor: Send + Sync {
    /// Shape of a single observation this predictor accepts
    fn input_shape(&self) -> InputShape;

    /// Length of every action-value vector produced
    fn action_count(&self) -> usize;

    /// Device every tensor of this predictor lives on
    fn device(&self) -> Device;

    /// `[batch, frames, height, width]` → `[batch, actions]`, without
    /// recording anything for backpropagation
    fn predict(&self, observations: ArrayView4<f32>) -> Result<Array2<f32>>;
}
