use ndarray::{Array, Dimension, Zip};
use serde::{Serialize, Deserialize};

/// The activation functions a value-network stage can use.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Relu,
    Linear,
}

impl Activation {
    /// Apply the activation function to an array of any rank in-place.
    pub fn apply<D: Dimension>(&self, input: &mut Array<f32, D>) {
        match self {
            Activation::Relu => {
                input.mapv_inplace(|v| v.max(0.0));
            }
            Activation::Linear => {}
        }
    }

    /// Multiply `gradient` in-place by the derivative of the activation,
    /// evaluated at the stored pre-activation values.
    pub fn backprop<D: Dimension>(&self, gradient: &mut Array<f32, D>, pre_activation: &Array<f32, D>) {
        match self {
            Activation::Relu => {
                Zip::from(gradient)
                    .and(pre_activation)
                    .for_each(|g, &z| {
                        if z <= 0.0 {
                            *g = 0.0;
                        }
                    });
            }
            // Derivative of linear activation is always 1
            Activation::Linear => {}
        }
    }
}
