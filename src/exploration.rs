//! Exploration-rate scheduling.
//!
//! The probability of taking a uniformly random action decays with the
//! number of elapsed training steps. Both policies are pure functions of the
//! step count and the configuration; the caller picks the policy per call.

use ndarray::{ArrayView3, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{DqnError, Result};
use crate::network::ActionValuePredictor;
use crate::target::argmax_first;

/// How epsilon decays from `start_eps` towards `end_eps`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayPolicy {
    /// Linear interpolation reaching `end_eps` at `anneal_until`, clamped afterwards
    Linear,
    /// `end_eps + (start_eps - end_eps) * exp(-steps / decay)`; never reaches `end_eps`
    Exponential,
}

/// Exploration schedule parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorationConfig {
    pub start_eps: f32,
    pub end_eps: f32,
    /// Step count at which the linear schedule reaches `end_eps`
    pub anneal_until: u64,
    /// Time constant of the exponential schedule, in steps
    pub decay: f32,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        ExplorationConfig {
            start_eps: 1.0,
            end_eps: 0.1,
            anneal_until: 300_000,
            decay: 1000.0,
        }
    }
}

impl ExplorationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.end_eps >= 0.0 && self.end_eps <= self.start_eps && self.start_eps <= 1.0) {
            return Err(DqnError::invalid_parameter(
                "start_eps/end_eps".to_string(),
                format!(
                    "need 1 >= start_eps >= end_eps >= 0, got start_eps={} end_eps={}",
                    self.start_eps, self.end_eps
                ),
            ));
        }
        if self.anneal_until == 0 {
            return Err(DqnError::invalid_parameter("anneal_until", "must be at least 1"));
        }
        if !(self.decay.is_finite() && self.decay > 0.0) {
            return Err(DqnError::invalid_parameter(
                "decay".to_string(),
                format!("must be positive and finite, got {}", self.decay),
            ));
        }
        Ok(())
    }

    /// Exploration probability after `steps` training steps under `policy`
    pub fn select_epsilon(&self, steps: u64, policy: DecayPolicy) -> f32 {
        match policy {
            DecayPolicy::Linear => self.linear(steps),
            DecayPolicy::Exponential => self.exponential(steps),
        }
    }

    pub fn linear(&self, steps: u64) -> f32 {
        if steps >= self.anneal_until {
            return self.end_eps;
        }
        let start = self.start_eps as f64;
        let end = self.end_eps as f64;
        (start - (start - end) / self.anneal_until as f64 * steps as f64) as f32
    }

    /// Strictly above `end_eps` only while the decayed term survives rounding
    /// to f32. With the defaults that holds up to about 19_000 steps; from
    /// 20_000 on the result is exactly `end_eps`.
    pub fn exponential(&self, steps: u64) -> f32 {
        let start = self.start_eps as f64;
        let end = self.end_eps as f64;
        (end + (start - end) * (-(steps as f64) / self.decay as f64).exp()) as f32
    }
}

/// Epsilon-greedy action selection over any action-value predictor
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpsilonGreedy {
    pub config: ExplorationConfig,
    pub policy: DecayPolicy,
}

impl EpsilonGreedy {
    pub fn new(config: ExplorationConfig, policy: DecayPolicy) -> Result<Self> {
        config.validate()?;
        Ok(EpsilonGreedy { config, policy })
    }

    pub fn epsilon(&self, steps: u64) -> f32 {
        self.config.select_epsilon(steps, self.policy)
    }

    /// Pick an action for a single observation.
    ///
    /// With probability `epsilon(steps)` the action is uniform over the
    /// predictor's actions; otherwise it is the first maximal Q-value.
    pub fn act<P, R>(&self, predictor: &P, observation: ArrayView3<f32>, steps: u64, rng: &mut R) -> Result<usize>
    where
        P: ActionValuePredictor + ?Sized,
        R: Rng + ?Sized,
    {
        if rng.gen::<f32>() < self.epsilon(steps) {
            return Ok(rng.gen_range(0..predictor.action_count()));
        }
        let q_values = predictor.predict(observation.insert_axis(Axis(0)))?;
        argmax_first(q_values.row(0))
            .ok_or_else(|| DqnError::Numerical("predictor returned no Q-values".to_string()))
    }
}
