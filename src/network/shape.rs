//! Layer-shape derivation for the value network.
//!
//! Hidden-layer sizes are a deterministic function of the input shape and
//! the configured kernels and strides. They are derived once, when a network
//! is built, and kept for validation and reference.

use serde::{Serialize, Deserialize};

use crate::config::{InputShape, NetworkConfig};
use crate::error::{DqnError, Result};

/// Output size of a valid convolution: `floor((d - k) / s) + 1`.
///
/// Fails with a shape error when the result is not positive, which includes
/// every kernel larger than its input.
pub fn conv_output_size(input: usize, kernel: usize, stride: usize) -> Result<usize> {
    if kernel == 0 || stride == 0 {
        return Err(DqnError::shape(format!(
            "kernel ({}) and stride ({}) must be positive",
            kernel, stride
        )));
    }
    let size = (input as i64 - kernel as i64).div_euclid(stride as i64) + 1;
    if size <= 0 {
        return Err(DqnError::shape(format!(
            "input of size {} with kernel {} and stride {} yields output size {}",
            input, kernel, stride, size
        )));
    }
    Ok(size as usize)
}

/// Channels and spatial size of one feature map
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMapShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl FeatureMapShape {
    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every intermediate size of the value network
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerShapes {
    pub input: InputShape,
    pub conv: [FeatureMapShape; 3],
    /// Width of the flattened final feature map
    pub flat_features: usize,
    pub hidden_units: usize,
    pub actions: usize,
}

impl LayerShapes {
    pub fn derive(input: InputShape, action_count: usize, config: &NetworkConfig) -> Result<Self> {
        if input.frames == 0 || input.height == 0 || input.width == 0 {
            return Err(DqnError::shape(format!("input shape {:?} has a zero dimension", input.dims())));
        }
        if action_count == 0 {
            return Err(DqnError::shape("action count must be at least 1"));
        }
        if config.hidden_units == 0 {
            return Err(DqnError::shape("hidden layer width must be at least 1"));
        }

        let mut previous = FeatureMapShape {
            channels: input.frames,
            height: input.height,
            width: input.width,
        };
        let mut conv = [previous; 3];
        for (i, stage) in config.stages().iter().enumerate() {
            if stage.channels == 0 {
                return Err(DqnError::shape(format!("conv{} has zero output channels", i + 1)));
            }
            let height = conv_output_size(previous.height, stage.kernel_size, stage.stride)
                .map_err(|e| DqnError::shape(format!("conv{} height: {}", i + 1, e)))?;
            let width = conv_output_size(previous.width, stage.kernel_size, stage.stride)
                .map_err(|e| DqnError::shape(format!("conv{} width: {}", i + 1, e)))?;
            previous = FeatureMapShape {
                channels: stage.channels,
                height,
                width,
            };
            conv[i] = previous;
        }

        Ok(LayerShapes {
            input,
            conv,
            flat_features: previous.len(),
            hidden_units: config.hidden_units,
            actions: action_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv_output_size_formula() {
        assert_eq!(conv_output_size(64, 8, 2).unwrap(), 29);
        assert_eq!(conv_output_size(29, 4, 2).unwrap(), 13);
        assert_eq!(conv_output_size(13, 4, 1).unwrap(), 10);
        assert_eq!(conv_output_size(8, 8, 2).unwrap(), 1);
        assert_eq!(conv_output_size(9, 8, 2).unwrap(), 1);
    }

    #[test]
    fn test_conv_output_size_rejects_non_positive() {
        // floor((7 - 8) / 2) + 1 == 0, and truncating division would give 1
        assert!(matches!(conv_output_size(7, 8, 2), Err(DqnError::Shape(_))));
        assert!(matches!(conv_output_size(3, 8, 1), Err(DqnError::Shape(_))));
        assert!(matches!(conv_output_size(10, 0, 1), Err(DqnError::Shape(_))));
        assert!(matches!(conv_output_size(10, 3, 0), Err(DqnError::Shape(_))));
    }

    #[test]
    fn test_default_architecture_shapes() {
        let shapes = LayerShapes::derive(InputShape::default(), 6, &NetworkConfig::default()).unwrap();
        assert_eq!(shapes.conv[0], FeatureMapShape { channels: 32, height: 29, width: 29 });
        assert_eq!(shapes.conv[1], FeatureMapShape { channels: 64, height: 13, width: 13 });
        assert_eq!(shapes.conv[2], FeatureMapShape { channels: 96, height: 10, width: 10 });
        assert_eq!(shapes.flat_features, 9600);
        assert_eq!(shapes.hidden_units, 128);
        assert_eq!(shapes.actions, 6);
    }

    #[test]
    fn test_non_square_input() {
        let shapes = LayerShapes::derive(InputShape::new(4, 84, 64), 2, &NetworkConfig::default()).unwrap();
        assert_eq!((shapes.conv[0].height, shapes.conv[0].width), (39, 29));
        assert_eq!((shapes.conv[1].height, shapes.conv[1].width), (18, 13));
        assert_eq!((shapes.conv[2].height, shapes.conv[2].width), (15, 10));
    }

    #[test]
    fn test_too_small_input_fails_at_third_stage() {
        // 25 -> 9 -> 3, and the stride-1 kernel of 4 no longer fits
        let err = LayerShapes::derive(InputShape::new(4, 25, 25), 2, &NetworkConfig::default()).unwrap_err();
        match err {
            DqnError::Shape(msg) => assert!(msg.contains("conv3")),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(LayerShapes::derive(InputShape::new(4, 26, 26), 2, &NetworkConfig::default()).is_ok());
    }
}
