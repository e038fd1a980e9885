//! One optimization step of the online network.

use log::{debug, warn};

use crate::batch::Batch;
use crate::config::TrainerConfig;
use crate::error::{DqnError, Result};
use crate::loss::{Loss, MSE};
use crate::network::{ActionValuePredictor, ValueNetwork};
use crate::optimizer::OptimizerWrapper;
use crate::target::build_targets;

/// Owns the online network and its optimizer state.
///
/// The target network is never owned here: it is borrowed immutably for
/// each step and synchronised only when the caller asks for it.
#[derive(Clone, Debug)]
pub struct Trainer {
    online: ValueNetwork,
    optimizer: OptimizerWrapper,
    config: TrainerConfig,
    steps: u64,
}

impl Trainer {
    pub fn new(online: ValueNetwork, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        let optimizer = OptimizerWrapper::from_config(&config.optimizer);
        Ok(Trainer {
            online,
            optimizer,
            config,
            steps: 0,
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Number of successful training steps
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn online(&self) -> &ValueNetwork {
        &self.online
    }

    pub fn online_mut(&mut self) -> &mut ValueNetwork {
        &mut self.online
    }

    pub fn into_online(self) -> ValueNetwork {
        self.online
    }

    /// Copy the online parameters into `target`
    pub fn sync_target(&self, target: &mut ValueNetwork) -> Result<()> {
        target.copy_parameters_from(&self.online)?;
        debug!("target network synchronised after {} steps", self.steps);
        Ok(())
    }

    /// Fit the online network to the TD targets of `batch` with one
    /// optimizer step and return the loss before the update.
    ///
    /// On error the online parameters and optimizer state are unchanged.
    pub fn train_step<P>(&mut self, batch: &Batch, target: &P) -> Result<f32>
    where
        P: ActionValuePredictor + ?Sized,
    {
        batch.validate()?;
        self.online.device().ensure_same(target.device())?;
        let input_shape = self.online.input_shape();
        if target.input_shape() != input_shape || target.action_count() != self.online.action_count() {
            return Err(DqnError::shape(format!(
                "target network maps {:?} to {} actions, online network maps {:?} to {}",
                target.input_shape().dims(),
                target.action_count(),
                input_shape.dims(),
                self.online.action_count()
            )));
        }
        let states = batch.stack_states(input_shape)?;
        let next_states = batch.stack_next_states(input_shape)?;

        let qs_next_target = target.predict(next_states.view())?;
        let qs_next = self.online.forward(next_states.view())?;
        let (qs, trace) = self.online.forward_traced(states.view())?;

        let targets = build_targets(
            qs.view(),
            qs_next.view(),
            qs_next_target.view(),
            &batch.actions,
            &batch.rewards,
            &batch.terminals,
            self.config.gamma,
        )?;

        let loss = MSE.compute_batch(qs.view(), targets.view())?;
        if !loss.is_finite() {
            warn!("non-finite loss {} at step {}", loss, self.steps);
            return Err(DqnError::Numerical(format!("loss is {}", loss)));
        }

        let output_gradient = MSE.gradient_batch(qs.view(), targets.view())?;
        let gradients = self.online.backward(&trace, output_gradient)?;
        if !gradients.is_finite() {
            warn!("non-finite gradients at step {} (loss {})", self.steps, loss);
            return Err(DqnError::Numerical("gradients contain non-finite values".to_string()));
        }

        self.online
            .apply_gradients(&gradients, &mut self.optimizer, self.config.learning_rate)?;
        self.steps += 1;
        debug!(
            "step {}: loss {:.6}, batch {}, gradient norm {:.6}",
            self.steps,
            loss,
            batch.len(),
            gradients.global_norm()
        );
        Ok(loss)
    }
}
