//! Convolutional layer for processing stacked frames
//!
//! The convolution is computed per example by unrolling every receptive
//! field into a column (im2col) and multiplying by the kernel matrix. Padding
//! is not supported: the value network only uses valid convolutions.

use ndarray::{s, Array1, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, ArrayViewMut2, Axis, Zip};
use ndarray::parallel::prelude::*;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::device::Device;
use crate::error::{DqnError, Result};
use crate::layers::initialization::WeightInit;
use crate::network::shape::conv_output_size;

/// 2D Convolutional Layer
///
/// Applies a square-kernel 2D convolution over a batch of
/// `[batch, channels, height, width]` inputs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Conv2DLayer {
    /// Convolution kernels/filters [out_channels, in_channels, kernel_size, kernel_size]
    pub kernels: Array4<f32>,

    /// Bias terms for each output channel
    pub biases: Array1<f32>,

    /// Activation function
    pub activation: Activation,

    /// Stride for convolution, both axes
    pub stride: usize,

    /// Side length of the square kernel
    pub kernel_size: usize,

    /// Number of input channels
    pub in_channels: usize,

    /// Number of output channels (filters)
    pub out_channels: usize,
}

/// Everything the backward pass of a convolution needs from its forward pass
#[derive(Clone, Debug)]
pub struct ConvCache {
    pub input: Array4<f32>,
    pub pre_activation: Array4<f32>,
}

/// Parameter gradients of a [`Conv2DLayer`]
#[derive(Clone, Debug)]
pub struct ConvGradients {
    pub kernels: Array4<f32>,
    pub biases: Array1<f32>,
}

struct ExampleGradients {
    kernels: Array2<f32>,
    biases: Array1<f32>,
    input: Option<Array3<f32>>,
}

impl Conv2DLayer {
    /// Create a new 2D convolutional layer with zero biases
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 || kernel_size == 0 || stride == 0 {
            return Err(DqnError::shape(format!(
                "convolution needs positive channels, kernel and stride (in={}, out={}, kernel={}, stride={})",
                in_channels, out_channels, kernel_size, stride
            )));
        }
        let fan_in = in_channels * kernel_size * kernel_size;
        let fan_out = out_channels * kernel_size * kernel_size;

        let kernels = init.initialize(
            (out_channels, in_channels, kernel_size, kernel_size),
            fan_in,
            fan_out,
            rng,
        )?;

        Ok(Conv2DLayer {
            kernels,
            biases: Array1::zeros(out_channels),
            activation,
            stride,
            kernel_size,
            in_channels,
            out_channels,
        })
    }

    /// Spatial output size for an input of `(height, width)`
    pub fn output_dim(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        Ok((
            conv_output_size(height, self.kernel_size, self.stride)?,
            conv_output_size(width, self.kernel_size, self.stride)?,
        ))
    }

    /// Inference forward pass; nothing is retained for backpropagation
    pub fn forward(&self, input: ArrayView4<f32>, device: Device) -> Result<Array4<f32>> {
        let mut output = self.convolve(input, device)?;
        self.activation.apply(&mut output);
        Ok(output)
    }

    /// Training forward pass; returns the activated output together with the
    /// cache consumed by [`Conv2DLayer::backward`]
    pub fn forward_traced(&self, input: ArrayView4<f32>, device: Device) -> Result<(Array4<f32>, ConvCache)> {
        let pre_activation = self.convolve(input, device)?;
        let mut output = pre_activation.clone();
        self.activation.apply(&mut output);
        let cache = ConvCache {
            input: input.to_owned(),
            pre_activation,
        };
        Ok((output, cache))
    }

    /// Backward pass; returns the gradient with respect to the layer input
    /// and the parameter gradients summed over the batch.
    pub fn backward(&self, cache: &ConvCache, output_gradient: Array4<f32>, device: Device) -> Result<(Array4<f32>, ConvGradients)> {
        let (input, gradients) = self.backward_impl(cache, output_gradient, true, device)?;
        let input = input.unwrap_or_else(|| Array4::zeros(cache.input.dim()));
        Ok((input, gradients))
    }

    /// Backward pass for a first layer, skipping the input gradient
    pub fn parameter_gradients(&self, cache: &ConvCache, output_gradient: Array4<f32>, device: Device) -> Result<ConvGradients> {
        let (_, gradients) = self.backward_impl(cache, output_gradient, false, device)?;
        Ok(gradients)
    }

    // Per-example contributions are summed in batch order on every device,
    // so gradients do not depend on the device.
    fn backward_impl(
        &self,
        cache: &ConvCache,
        output_gradient: Array4<f32>,
        input_gradient: bool,
        device: Device,
    ) -> Result<(Option<Array4<f32>>, ConvGradients)> {
        if output_gradient.dim() != cache.pre_activation.dim() {
            return Err(DqnError::shape(format!(
                "output gradient {:?} does not match forward output {:?}",
                output_gradient.dim(),
                cache.pre_activation.dim()
            )));
        }
        let (batch, _, height, width) = cache.input.dim();
        let (_, _, out_h, out_w) = output_gradient.dim();

        let mut grad = output_gradient;
        self.activation.backprop(&mut grad, &cache.pre_activation);
        let grad = grad.into_shape((batch, self.out_channels, out_h * out_w))?;
        let kernel_matrix = self.kernel_matrix()?;

        let example = |b: usize| -> ExampleGradients {
            let g = grad.index_axis(Axis(0), b);
            let cols = self.im2col(cache.input.index_axis(Axis(0), b), out_h, out_w);
            let input = if input_gradient {
                let grad_cols = kernel_matrix.t().dot(&g);
                Some(self.col2im(grad_cols.view(), height, width, out_h, out_w))
            } else {
                None
            };
            ExampleGradients {
                kernels: g.dot(&cols.t()),
                biases: g.sum_axis(Axis(1)),
                input,
            }
        };

        let per_example: Vec<ExampleGradients> = if device.is_parallel() {
            (0..batch).into_par_iter().map(example).collect()
        } else {
            (0..batch).map(example).collect()
        };

        let mut kernels = Array2::<f32>::zeros(kernel_matrix.dim());
        let mut biases = Array1::<f32>::zeros(self.out_channels);
        let mut inputs = if input_gradient {
            Some(Array4::<f32>::zeros(cache.input.dim()))
        } else {
            None
        };
        for (b, ex) in per_example.into_iter().enumerate() {
            kernels += &ex.kernels;
            biases += &ex.biases;
            if let (Some(all), Some(one)) = (inputs.as_mut(), ex.input) {
                all.index_axis_mut(Axis(0), b).assign(&one);
            }
        }

        let kernels = kernels.into_shape(self.kernels.dim())?;
        Ok((inputs, ConvGradients { kernels, biases }))
    }

    /// Pre-activation convolution of a whole batch
    fn convolve(&self, input: ArrayView4<f32>, device: Device) -> Result<Array4<f32>> {
        let (batch, channels, height, width) = input.dim();
        if channels != self.in_channels {
            return Err(DqnError::shape(format!(
                "convolution expects {} input channels, got {}",
                self.in_channels, channels
            )));
        }
        let (out_h, out_w) = self.output_dim(height, width)?;
        let kernel_matrix = self.kernel_matrix()?;

        let mut output = Array3::<f32>::zeros((batch, self.out_channels, out_h * out_w));
        let example = |mut dst: ArrayViewMut2<f32>, image: ArrayView3<f32>| {
            let cols = self.im2col(image, out_h, out_w);
            dst.assign(&kernel_matrix.dot(&cols));
            dst += &self.biases.view().insert_axis(Axis(1));
        };
        let zip = Zip::from(output.axis_iter_mut(Axis(0))).and(input.axis_iter(Axis(0)));
        if device.is_parallel() {
            zip.par_for_each(example);
        } else {
            zip.for_each(example);
        }

        Ok(output.into_shape((batch, self.out_channels, out_h, out_w))?)
    }

    /// Kernels flattened to `[out_channels, in_channels * k * k]`
    fn kernel_matrix(&self) -> Result<ArrayView2<'_, f32>> {
        let k = self.kernel_size;
        Ok(self.kernels.view().into_shape((self.out_channels, self.in_channels * k * k))?)
    }

    /// Unroll every receptive field of one example into a column.
    ///
    /// Row `(c * k + kh) * k + kw` holds input channel `c` at kernel offset
    /// `(kh, kw)`; column `oh * out_w + ow` is the output position.
    fn im2col(&self, image: ArrayView3<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
        let k = self.kernel_size;
        let st = self.stride as isize;
        let mut cols = Array2::zeros((self.in_channels * k * k, out_h * out_w));

        for c in 0..self.in_channels {
            for kh in 0..k {
                for kw in 0..k {
                    let window = image.slice(s![
                        c,
                        kh..kh + (out_h - 1) * self.stride + 1;st,
                        kw..kw + (out_w - 1) * self.stride + 1;st
                    ]);
                    let mut row = cols.row_mut((c * k + kh) * k + kw);
                    for (dst, &v) in row.iter_mut().zip(window.iter()) {
                        *dst = v;
                    }
                }
            }
        }

        cols
    }

    /// Inverse of [`Conv2DLayer::im2col`]: scatter-add columns back onto the input grid
    fn col2im(&self, cols: ArrayView2<f32>, height: usize, width: usize, out_h: usize, out_w: usize) -> Array3<f32> {
        let k = self.kernel_size;
        let st = self.stride as isize;
        let mut image = Array3::zeros((self.in_channels, height, width));

        for c in 0..self.in_channels {
            for kh in 0..k {
                for kw in 0..k {
                    let mut window = image.slice_mut(s![
                        c,
                        kh..kh + (out_h - 1) * self.stride + 1;st,
                        kw..kw + (out_w - 1) * self.stride + 1;st
                    ]);
                    let row = cols.row((c * k + kh) * k + kw);
                    for (dst, &g) in window.iter_mut().zip(row.iter()) {
                        *dst += g;
                    }
                }
            }
        }

        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(in_c: usize, out_c: usize, k: usize, stride: usize) -> Conv2DLayer {
        let mut rng = StdRng::seed_from_u64(11);
        Conv2DLayer::new(in_c, out_c, k, stride, Activation::Relu, WeightInit::HeNormal, &mut rng).unwrap()
    }

    #[test]
    fn test_conv2d_forward_shape() {
        let layer = layer(4, 8, 8, 2);
        let input = Array4::<f32>::zeros((3, 4, 64, 64));
        let output = layer.forward(input.view(), Device::Cpu).unwrap();
        assert_eq!(output.dim(), (3, 8, 29, 29));
    }

    #[test]
    fn test_conv2d_matches_direct_sum() {
        let mut layer = layer(2, 3, 3, 2);
        layer.activation = Activation::Linear;
        layer.biases = Array1::from(vec![0.5, -0.25, 1.0]);
        let input = Array4::from_shape_fn((2, 2, 7, 5), |(b, c, h, w)| {
            (b * 31 + c * 17 + h * 5 + w) as f32 * 0.01 - 0.3
        });

        let output = layer.forward(input.view(), Device::Cpu).unwrap();
        let (out_h, out_w) = layer.output_dim(7, 5).unwrap();
        assert_eq!((out_h, out_w), (3, 2));

        for b in 0..2 {
            for oc in 0..3 {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let mut sum = layer.biases[oc];
                        for ic in 0..2 {
                            for kh in 0..3 {
                                for kw in 0..3 {
                                    sum += input[[b, ic, oh * 2 + kh, ow * 2 + kw]] * layer.kernels[[oc, ic, kh, kw]];
                                }
                            }
                        }
                        assert!((output[[b, oc, oh, ow]] - sum).abs() < 1e-5);
                    }
                }
            }
        }
    }

    #[test]
    fn test_conv2d_rejects_wrong_channels() {
        let layer = layer(4, 8, 3, 1);
        let input = Array4::<f32>::zeros((1, 3, 10, 10));
        assert!(matches!(layer.forward(input.view(), Device::Cpu), Err(DqnError::Shape(_))));
    }

    #[test]
    fn test_conv2d_rejects_kernel_larger_than_input() {
        let layer = layer(1, 1, 8, 2);
        let input = Array4::<f32>::zeros((1, 1, 6, 6));
        assert!(matches!(layer.forward(input.view(), Device::Cpu), Err(DqnError::Shape(_))));
    }

    #[test]
    fn test_col2im_is_adjoint_of_im2col() {
        // <im2col(x), y> == <x, col2im(y)> for any x, y
        let layer = layer(2, 1, 3, 2);
        let x = Array3::from_shape_fn((2, 7, 7), |(c, h, w)| (c + 2 * h + 3 * w) as f32 * 0.1);
        let (out_h, out_w) = layer.output_dim(7, 7).unwrap();
        let cols = layer.im2col(x.view(), out_h, out_w);
        let y = Array2::from_shape_fn(cols.dim(), |(r, p)| ((r * 7 + p) % 5) as f32 - 2.0);
        let lhs = (&cols * &y).sum();
        let rhs = (&x * &layer.col2im(y.view(), 7, 7, out_h, out_w)).sum();
        assert!((lhs - rhs).abs() < 1e-3);
    }

    #[test]
    fn test_parallel_device_matches_cpu() {
        let layer = layer(3, 4, 4, 2);
        let input = Array4::from_shape_fn((5, 3, 12, 12), |(b, c, h, w)| ((b + c * h + w) % 7) as f32 / 7.0);
        let (seq, seq_cache) = layer.forward_traced(input.view(), Device::Cpu).unwrap();
        let (par, par_cache) = layer.forward_traced(input.view(), Device::CpuParallel).unwrap();
        assert_eq!(seq, par);

        let upstream = Array4::from_elem(seq.dim(), 0.5);
        let (gi_seq, g_seq) = layer.backward(&seq_cache, upstream.clone(), Device::Cpu).unwrap();
        let (gi_par, g_par) = layer.backward(&par_cache, upstream.clone(), Device::CpuParallel).unwrap();
        assert_eq!(g_seq.kernels, g_par.kernels);
        assert_eq!(g_seq.biases, g_par.biases);
        assert_eq!(gi_seq, gi_par);

        let only_params = layer.parameter_gradients(&seq_cache, upstream, Device::Cpu).unwrap();
        assert_eq!(only_params.kernels, g_seq.kernels);
    }
}
