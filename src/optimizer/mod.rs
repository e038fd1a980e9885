//! Gradient-descent optimizers.
//!
//! Parameters are addressed by a stable slot index, so optimizers with
//! per-parameter state (Adam's moment estimates) keep one state entry per
//! tensor regardless of its rank.

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn, Zip};
use serde::{Serialize, Deserialize};

use crate::config::OptimizerConfig;

pub trait Optimizer {
    /// Called once before the parameter updates of one optimization step
    fn begin_step(&mut self) {}

    /// Apply one update to the parameter tensor in `slot`
    fn update(&mut self, slot: usize, param: ArrayViewMutD<f32>, gradient: ArrayViewD<f32>, learning_rate: f32);
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl OptimizerWrapper {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        match *config {
            OptimizerConfig::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerConfig::Adam { beta1, beta2, epsilon } => OptimizerWrapper::Adam(Adam::new(beta1, beta2, epsilon)),
        }
    }
}

impl Optimizer for OptimizerWrapper {
    fn begin_step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.begin_step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.begin_step(),
        }
    }

    fn update(&mut self, slot: usize, param: ArrayViewMutD<f32>, gradient: ArrayViewD<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update(slot, param, gradient, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update(slot, param, gradient, learning_rate),
        }
    }
}

/// Plain stochastic gradient descent
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _slot: usize, mut param: ArrayViewMutD<f32>, gradient: ArrayViewD<f32>, learning_rate: f32) {
        param.zip_mut_with(&gradient, |w, &g| *w -= learning_rate * g);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Moments {
    m: ArrayD<f32>,
    v: ArrayD<f32>,
}

/// Adam: bias-corrected first/second moment estimates per parameter tensor
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    moments: Vec<Option<Moments>>,
    /// Number of optimization steps begun so far
    pub t: u64,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            moments: Vec::new(),
            t: 0,
        }
    }

    fn moments(&mut self, slot: usize, dim: IxDyn) -> &mut Moments {
        if self.moments.len() <= slot {
            self.moments.resize_with(slot + 1, || None);
        }
        self.moments[slot].get_or_insert_with(|| Moments {
            m: ArrayD::zeros(dim.clone()),
            v: ArrayD::zeros(dim),
        })
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update(&mut self, slot: usize, mut param: ArrayViewMutD<f32>, gradient: ArrayViewD<f32>, learning_rate: f32) {
        let t = self.t.clamp(1, i32::MAX as u64) as i32;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(t);
        let bias_correction2 = 1.0 - beta2.powi(t);

        let moments = self.moments(slot, gradient.raw_dim());
        Zip::from(&mut param)
            .and(&mut moments.m)
            .and(&mut moments.v)
            .and(&gradient)
            .for_each(|w, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}
