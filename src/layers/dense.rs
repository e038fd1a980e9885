use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::initialization::WeightInit;

/// A fully connected (dense) layer in a neural network
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DenseLayer {
    /// `[input_size, output_size]`
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
}

/// Everything the backward pass of a dense layer needs from its forward pass
#[derive(Clone, Debug)]
pub struct DenseCache {
    pub input: Array2<f32>,
    pub pre_activation: Array2<f32>,
}

/// Parameter gradients of a [`DenseLayer`]
#[derive(Clone, Debug)]
pub struct DenseGradients {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl DenseLayer {
    /// Create a new dense layer with the given input size, output size, and
    /// activation function. Biases start at zero.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(DqnError::shape(format!(
                "dense layer needs positive sizes, got {} -> {}",
                input_size, output_size
            )));
        }
        let weights = init.initialize((input_size, output_size), input_size, output_size, rng)?;
        Ok(DenseLayer {
            weights,
            biases: Array1::zeros(output_size),
            activation,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Inference forward pass for a batch of row vectors
    pub fn forward(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut outputs = self.linear(inputs)?;
        self.activation.apply(&mut outputs);
        Ok(outputs)
    }

    /// Training forward pass; also returns the cache for [`DenseLayer::backward`]
    pub fn forward_traced(&self, inputs: ArrayView2<f32>) -> Result<(Array2<f32>, DenseCache)> {
        let pre_activation = self.linear(inputs)?;
        let mut outputs = pre_activation.clone();
        self.activation.apply(&mut outputs);
        let cache = DenseCache {
            input: inputs.to_owned(),
            pre_activation,
        };
        Ok((outputs, cache))
    }

    /// Backward pass for a batch; returns the gradient with respect to the
    /// input and the parameter gradients summed over the batch
    pub fn backward(&self, cache: &DenseCache, output_gradient: Array2<f32>) -> Result<(Array2<f32>, DenseGradients)> {
        if output_gradient.dim() != cache.pre_activation.dim() {
            return Err(DqnError::shape(format!(
                "output gradient {:?} does not match forward output {:?}",
                output_gradient.dim(),
                cache.pre_activation.dim()
            )));
        }
        let mut adjusted = output_gradient;
        self.activation.backprop(&mut adjusted, &cache.pre_activation);

        let gradients = DenseGradients {
            weights: cache.input.t().dot(&adjusted),
            biases: adjusted.sum_axis(Axis(0)),
        };
        let input_gradient = adjusted.dot(&self.weights.t());
        Ok((input_gradient, gradients))
    }

    fn linear(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_size() {
            return Err(DqnError::shape(format!(
                "dense layer expects {} inputs, got {}",
                self.input_size(),
                inputs.ncols()
            )));
        }
        Ok(inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0)))
    }
}
