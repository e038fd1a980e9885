//! The convolutional value network.
//!
//! Three valid convolutions with ReLU, a flatten, one ReLU hidden layer and a
//! linear output layer with one unit per action. Inference goes through
//! [`ValueNetwork::forward`], which takes `&self` and records nothing.
//! Training goes through [`ValueNetwork::forward_traced`], which hands the
//! caller an owned [`ForwardTrace`] to feed into [`ValueNetwork::backward`].

pub mod shape;
mod predictor;

pub use predictor::ActionValuePredictor;

use log::info;
use ndarray::{Array1, Array2, Array4, ArrayD, ArrayView3, ArrayView4, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::config::{InputShape, NetworkConfig};
use crate::device::Device;
use crate::error::{DqnError, Result};
use crate::layers::{Conv2DLayer, ConvCache, ConvGradients, DenseCache, DenseGradients, DenseLayer};
use crate::optimizer::{Optimizer, OptimizerWrapper};
use shape::LayerShapes;

/// Number of parameter tensors (kernels/weights and biases of five layers)
pub const PARAMETER_TENSORS: usize = 10;

/// Convolutional Q-network mapping `[batch, frames, height, width]`
/// observations to `[batch, actions]` action values.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ValueNetwork {
    pub conv1: Conv2DLayer,
    pub conv2: Conv2DLayer,
    pub conv3: Conv2DLayer,
    pub fc1: DenseLayer,
    pub out: DenseLayer,
    shapes: LayerShapes,
    config: NetworkConfig,
    device: Device,
}

/// Intermediates of one training-mode forward pass
#[derive(Clone, Debug)]
pub struct ForwardTrace {
    conv1: ConvCache,
    conv2: ConvCache,
    conv3: ConvCache,
    fc1: DenseCache,
    out: DenseCache,
}

impl ForwardTrace {
    pub fn batch_size(&self) -> usize {
        self.out.input.nrows()
    }
}

/// Gradients of a scalar loss with respect to every network parameter
#[derive(Clone, Debug)]
pub struct Gradients {
    pub conv1: ConvGradients,
    pub conv2: ConvGradients,
    pub conv3: ConvGradients,
    pub fc1: DenseGradients,
    pub out: DenseGradients,
}

impl Gradients {
    /// All gradient tensors, in the network's parameter slot order
    pub fn tensors(&self) -> [ArrayViewD<'_, f32>; PARAMETER_TENSORS] {
        [
            self.conv1.kernels.view().into_dyn(),
            self.conv1.biases.view().into_dyn(),
            self.conv2.kernels.view().into_dyn(),
            self.conv2.biases.view().into_dyn(),
            self.conv3.kernels.view().into_dyn(),
            self.conv3.biases.view().into_dyn(),
            self.fc1.weights.view().into_dyn(),
            self.fc1.biases.view().into_dyn(),
            self.out.weights.view().into_dyn(),
            self.out.biases.view().into_dyn(),
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| t.iter().all(|g| g.is_finite()))
    }

    /// L2 norm over all gradient entries
    pub fn global_norm(&self) -> f32 {
        self.tensors()
            .iter()
            .map(|t| t.iter().map(|g| g * g).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }
}

/// An owned copy of every parameter of a network.
///
/// Two snapshots compare equal exactly when all parameters are bitwise equal
/// as floats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    tensors: Vec<ArrayD<f32>>,
}

impl ParameterSnapshot {
    pub fn tensors(&self) -> &[ArrayD<f32>] {
        &self.tensors
    }

    /// Largest absolute elementwise difference, or `None` when the two
    /// snapshots do not have the same layout
    pub fn max_abs_diff(&self, other: &ParameterSnapshot) -> Option<f32> {
        if self.tensors.len() != other.tensors.len() {
            return None;
        }
        let mut max = 0.0_f32;
        for (a, b) in self.tensors.iter().zip(&other.tensors) {
            if a.shape() != b.shape() {
                return None;
            }
            for (x, y) in a.iter().zip(b.iter()) {
                max = max.max((x - y).abs());
            }
        }
        Some(max)
    }
}

impl ValueNetwork {
    /// Build a network for observations of `input_shape` with one output per
    /// action. Fails with a shape error when any stage would produce an
    /// empty feature map.
    pub fn new(input_shape: InputShape, action_count: usize, config: NetworkConfig, device: Device) -> Result<Self> {
        let shapes = LayerShapes::derive(input_shape, action_count, &config)?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let [s1, s2, s3] = config.stages();
        let conv1 = Conv2DLayer::new(input_shape.frames, s1.channels, s1.kernel_size, s1.stride, Activation::Relu, config.hidden_init, &mut rng)?;
        let conv2 = Conv2DLayer::new(s1.channels, s2.channels, s2.kernel_size, s2.stride, Activation::Relu, config.hidden_init, &mut rng)?;
        let conv3 = Conv2DLayer::new(s2.channels, s3.channels, s3.kernel_size, s3.stride, Activation::Relu, config.hidden_init, &mut rng)?;
        let fc1 = DenseLayer::new(shapes.flat_features, shapes.hidden_units, Activation::Relu, config.hidden_init, &mut rng)?;
        let out = DenseLayer::new(shapes.hidden_units, action_count, Activation::Linear, config.output_init, &mut rng)?;

        let network = ValueNetwork {
            conv1,
            conv2,
            conv3,
            fc1,
            out,
            shapes,
            config,
            device,
        };
        info!(
            "value network: input {:?}, conv {:?} -> {:?} -> {:?}, flat {}, hidden {}, actions {}, {} parameters on {:?}",
            input_shape.dims(),
            (shapes.conv[0].channels, shapes.conv[0].height, shapes.conv[0].width),
            (shapes.conv[1].channels, shapes.conv[1].height, shapes.conv[1].width),
            (shapes.conv[2].channels, shapes.conv[2].height, shapes.conv[2].width),
            shapes.flat_features,
            shapes.hidden_units,
            shapes.actions,
            network.parameter_count(),
            device
        );
        Ok(network)
    }

    pub fn shapes(&self) -> &LayerShapes {
        &self.shapes
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn input_shape(&self) -> InputShape {
        self.shapes.input
    }

    pub fn action_count(&self) -> usize {
        self.shapes.actions
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }

    /// Inference pass over a batch of observations
    pub fn forward(&self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        self.check_input(&observations)?;
        let x = self.conv1.forward(observations, self.device)?;
        let x = self.conv2.forward(x.view(), self.device)?;
        let x = self.conv3.forward(x.view(), self.device)?;
        let x = flatten(x)?;
        let x = self.fc1.forward(x.view())?;
        self.out.forward(x.view())
    }

    /// Inference pass over one `(frames, height, width)` observation
    pub fn forward_single(&self, observation: ArrayView3<f32>) -> Result<Array1<f32>> {
        let q_values = self.forward(observation.insert_axis(Axis(0)))?;
        Ok(q_values.index_axis_move(Axis(0), 0))
    }

    /// Training-mode pass: the output plus the trace needed by
    /// [`ValueNetwork::backward`]
    pub fn forward_traced(&self, observations: ArrayView4<f32>) -> Result<(Array2<f32>, ForwardTrace)> {
        self.check_input(&observations)?;
        let (x, conv1) = self.conv1.forward_traced(observations, self.device)?;
        let (x, conv2) = self.conv2.forward_traced(x.view(), self.device)?;
        let (x, conv3) = self.conv3.forward_traced(x.view(), self.device)?;
        let x = flatten(x)?;
        let (x, fc1) = self.fc1.forward_traced(x.view())?;
        let (q_values, out) = self.out.forward_traced(x.view())?;
        let trace = ForwardTrace { conv1, conv2, conv3, fc1, out };
        Ok((q_values, trace))
    }

    /// Backpropagate `d loss / d output` through the traced pass
    pub fn backward(&self, trace: &ForwardTrace, output_gradient: Array2<f32>) -> Result<Gradients> {
        let (grad, out) = self.out.backward(&trace.out, output_gradient)?;
        let (grad, fc1) = self.fc1.backward(&trace.fc1, grad)?;

        let (b, c, h, w) = trace.conv3.pre_activation.dim();
        let grad = grad.as_standard_layout().into_owned().into_shape((b, c, h, w))?;
        let (grad, conv3) = self.conv3.backward(&trace.conv3, grad, self.device)?;
        let (grad, conv2) = self.conv2.backward(&trace.conv2, grad, self.device)?;
        let conv1 = self.conv1.parameter_gradients(&trace.conv1, grad, self.device)?;

        Ok(Gradients { conv1, conv2, conv3, fc1, out })
    }

    /// One optimizer step. Every gradient shape is checked before any
    /// parameter is touched.
    pub fn apply_gradients(&mut self, gradients: &Gradients, optimizer: &mut OptimizerWrapper, learning_rate: f32) -> Result<()> {
        let gradient_tensors = gradients.tensors();
        for (slot, (param, grad)) in self.parameters().iter().zip(gradient_tensors.iter()).enumerate() {
            if param.shape() != grad.shape() {
                return Err(DqnError::shape(format!(
                    "gradient for parameter {} has shape {:?}, expected {:?}",
                    slot,
                    grad.shape(),
                    param.shape()
                )));
            }
        }

        optimizer.begin_step();
        for (slot, (param, grad)) in self.parameters_mut().into_iter().zip(gradient_tensors).enumerate() {
            optimizer.update(slot, param, grad, learning_rate);
        }
        Ok(())
    }

    /// Overwrite every parameter with `other`'s. Both networks must share an
    /// architecture; the device of `self` is kept.
    pub fn copy_parameters_from(&mut self, other: &ValueNetwork) -> Result<()> {
        if self.shapes != other.shapes || !self.same_layout(other) {
            return Err(DqnError::shape(format!(
                "cannot copy parameters between architectures {:?} and {:?}",
                self.shapes, other.shapes
            )));
        }
        for (mut dst, src) in self.parameters_mut().into_iter().zip(other.parameters()) {
            dst.assign(&src);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            tensors: self.parameters().iter().map(|p| p.to_owned()).collect(),
        }
    }

    /// Parameter tensors in slot order:
    /// conv1 kernels/biases, conv2, conv3, fc1 weights/biases, out
    pub fn parameters(&self) -> [ArrayViewD<'_, f32>; PARAMETER_TENSORS] {
        [
            self.conv1.kernels.view().into_dyn(),
            self.conv1.biases.view().into_dyn(),
            self.conv2.kernels.view().into_dyn(),
            self.conv2.biases.view().into_dyn(),
            self.conv3.kernels.view().into_dyn(),
            self.conv3.biases.view().into_dyn(),
            self.fc1.weights.view().into_dyn(),
            self.fc1.biases.view().into_dyn(),
            self.out.weights.view().into_dyn(),
            self.out.biases.view().into_dyn(),
        ]
    }

    fn parameters_mut(&mut self) -> [ArrayViewMutD<'_, f32>; PARAMETER_TENSORS] {
        [
            self.conv1.kernels.view_mut().into_dyn(),
            self.conv1.biases.view_mut().into_dyn(),
            self.conv2.kernels.view_mut().into_dyn(),
            self.conv2.biases.view_mut().into_dyn(),
            self.conv3.kernels.view_mut().into_dyn(),
            self.conv3.biases.view_mut().into_dyn(),
            self.fc1.weights.view_mut().into_dyn(),
            self.fc1.biases.view_mut().into_dyn(),
            self.out.weights.view_mut().into_dyn(),
            self.out.biases.view_mut().into_dyn(),
        ]
    }

    fn same_layout(&self, other: &ValueNetwork) -> bool {
        let strides = |n: &ValueNetwork| [n.conv1.stride, n.conv2.stride, n.conv3.stride];
        strides(self) == strides(other)
            && self
                .parameters()
                .iter()
                .zip(other.parameters().iter())
                .all(|(a, b)| a.shape() == b.shape())
    }

    fn check_input(&self, observations: &ArrayView4<f32>) -> Result<()> {
        let (batch, frames, height, width) = observations.dim();
        if batch == 0 {
            return Err(DqnError::shape("observation batch is empty"));
        }
        let expected = self.shapes.input.dims();
        if (frames, height, width) != expected {
            return Err(DqnError::shape(format!(
                "observations have shape {:?}, network expects {:?}",
                (frames, height, width),
                expected
            )));
        }
        Ok(())
    }
}

impl ActionValuePredictor for ValueNetwork {
    fn input_shape(&self) -> InputShape {
        self.shapes.input
    }

    fn action_count(&self) -> usize {
        self.shapes.actions
    }

    fn device(&self) -> Device {
        self.device
    }

    fn predict(&self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        self.forward(observations)
    }
}

fn flatten(features: Array4<f32>) -> Result<Array2<f32>> {
    let (b, c, h, w) = features.dim();
    Ok(features.as_standard_layout().into_owned().into_shape((b, c * h * w))?)
}
