use ndarray::{Array, Dimension, ShapeBuilder};
use ndarray_rand::RandomExt;
use rand_distr::{Normal, Uniform};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// Xavier/Glorot normal initialization
    XavierNormal,

    /// He/Kaiming uniform initialization (for ReLU)
    HeUniform,

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,

    /// Uniform distribution with custom range
    Uniform { min: f32, max: f32 },

    /// Normal distribution with custom mean and std
    Normal { mean: f32, std: f32 },

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Draw a weight tensor of the given shape.
    ///
    /// `fan_in` and `fan_out` are the number of inputs and outputs feeding one
    /// unit; for a convolution they include the kernel area.
    pub fn initialize<Sh, D, R>(&self, shape: Sh, fan_in: usize, fan_out: usize, rng: &mut R) -> Result<Array<f32, D>>
    where
        Sh: ShapeBuilder<Dim = D>,
        D: Dimension,
        R: Rng + ?Sized,
    {
        match *self {
            WeightInit::XavierUniform => {
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                uniform(shape, -limit, limit, rng)
            }

            WeightInit::XavierNormal => {
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                normal(shape, 0.0, std, rng)
            }

            WeightInit::HeUniform => {
                let limit = (6.0 / fan_in as f32).sqrt();
                uniform(shape, -limit, limit, rng)
            }

            WeightInit::HeNormal => {
                let std = (2.0 / fan_in as f32).sqrt();
                normal(shape, 0.0, std, rng)
            }

            WeightInit::Uniform { min, max } => uniform(shape, min, max, rng),

            WeightInit::Normal { mean, std } => normal(shape, mean, std, rng),

            WeightInit::Zeros => Ok(Array::zeros(shape)),
        }
    }

    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        match activation {
            Activation::Relu => WeightInit::HeNormal,
            Activation::Linear => WeightInit::XavierNormal,
        }
    }
}

fn uniform<Sh, D, R>(shape: Sh, min: f32, max: f32, rng: &mut R) -> Result<Array<f32, D>>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng + ?Sized,
{
    if !(min < max) || !min.is_finite() || !max.is_finite() {
        return Err(DqnError::invalid_parameter(
            "weight_init".to_string(),
            format!("uniform range [{}, {}) is empty or not finite", min, max),
        ));
    }
    Ok(Array::random_using(shape, Uniform::new(min, max), rng))
}

fn normal<Sh, D, R>(shape: Sh, mean: f32, std: f32, rng: &mut R) -> Result<Array<f32, D>>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng + ?Sized,
{
    let dist = Normal::new(mean, std).map_err(|e| {
        DqnError::invalid_parameter("weight_init".to_string(), format!("normal({}, {}): {}", mean, std, e))
    })?;
    Ok(Array::random_using(shape, dist, rng))
}
