use ndarray::{Array2, ArrayView2};

use crate::error::{DqnError, Result};

/// Trait defining the interface for loss functions over a `[batch, actions]`
/// matrix of predictions and an equally shaped matrix of targets
pub trait Loss: Send + Sync {
    /// Compute the loss for a batch of predictions and targets
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Result<f32>;

    /// Compute the gradient of the loss with respect to predictions.
    /// Targets are treated as constants.
    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Result<Array2<f32>>;
}

/// Mean Squared Error, averaged over every element of the batch
#[derive(Clone, Copy, Debug, Default)]
pub struct MSE;

impl Loss for MSE {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Result<f32> {
        check_shapes(&predictions, &targets)?;
        let diff = &predictions - &targets;
        Ok((&diff * &diff).sum() / predictions.len() as f32)
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_shapes(&predictions, &targets)?;
        let scale = 2.0 / predictions.len() as f32;
        Ok((&predictions - &targets) * scale)
    }
}

fn check_shapes(predictions: &ArrayView2<f32>, targets: &ArrayView2<f32>) -> Result<()> {
    if predictions.dim() != targets.dim() {
        return Err(DqnError::shape(format!(
            "predictions {:?} and targets {:?} differ in shape",
            predictions.dim(),
            targets.dim()
        )));
    }
    if predictions.is_empty() {
        return Err(DqnError::shape("loss over an empty batch"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mse_averages_over_all_elements() {
        let predictions = array![[1.0, 2.0], [3.0, 4.0]];
        let targets = array![[1.0, 0.0], [3.0, 5.0]];
        // (0 + 4 + 0 + 1) / 4
        let loss = MSE.compute_batch(predictions.view(), targets.view()).unwrap();
        assert!((loss - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_mse_gradient() {
        let predictions = array![[1.0, 2.0], [3.0, 4.0]];
        let targets = array![[1.0, 0.0], [3.0, 5.0]];
        let grad = MSE.gradient_batch(predictions.view(), targets.view()).unwrap();
        assert_eq!(grad, array![[0.0, 1.0], [0.0, -0.5]]);
    }

    #[test]
    fn test_mse_rejects_mismatched_shapes() {
        let predictions = array![[1.0, 2.0]];
        let targets = array![[1.0], [2.0]];
        assert!(MSE.compute_batch(predictions.view(), targets.view()).is_err());
    }
}
