//! Configuration for the learning core.
//!
//! Every recognised option is an explicit field with a default; unknown keys
//! in a JSON document are rejected. Configuration is resolved once, when a
//! network or trainer is constructed.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::device::Device;
use crate::error::{DqnError, Result};
use crate::exploration::ExplorationConfig;
use crate::layers::WeightInit;

/// Shape of one Observation: `(frames, height, width)`, channel-major
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputShape {
    pub frames: usize,
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    pub fn new(frames: usize, height: usize, width: usize) -> Self {
        InputShape { frames, height, width }
    }

    /// `(frames, height, width)`
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.frames, self.height, self.width)
    }
}

impl Default for InputShape {
    fn default() -> Self {
        InputShape::new(4, 64, 64)
    }
}

/// One convolution stage of the value network
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvStageConfig {
    pub channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
}

impl ConvStageConfig {
    pub fn new(channels: usize, kernel_size: usize, stride: usize) -> Self {
        ConvStageConfig { channels, kernel_size, stride }
    }
}

/// Hyperparameters of the fixed value-network architecture
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub conv1: ConvStageConfig,
    pub conv2: ConvStageConfig,
    pub conv3: ConvStageConfig,
    /// Width of the fully-connected hidden layer
    pub hidden_units: usize,
    /// Initialisation of the convolution and hidden stages
    pub hidden_init: WeightInit,
    /// Initialisation of the output layer
    pub output_init: WeightInit,
    /// Seed for parameter initialisation; drawn from entropy when absent
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            conv1: ConvStageConfig::new(32, 8, 2),
            conv2: ConvStageConfig::new(64, 4, 2),
            conv3: ConvStageConfig::new(96, 4, 1),
            hidden_units: 128,
            hidden_init: WeightInit::for_activation(&Activation::Relu),
            output_init: WeightInit::for_activation(&Activation::Linear),
            seed: None,
        }
    }
}

impl NetworkConfig {
    pub fn stages(&self) -> [ConvStageConfig; 3] {
        [self.conv1, self.conv2, self.conv3]
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Optimizer selection for the trainer
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Hyperparameters of one optimization step
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    /// Discount factor applied to the bootstrapped next-state value
    pub gamma: f32,
    pub learning_rate: f32,
    pub optimizer: OptimizerConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            gamma: 0.9,
            learning_rate: 1e-4,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DqnError::invalid_parameter(
                "gamma".to_string(),
                format!("must lie in [0, 1], got {}", self.gamma),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DqnError::invalid_parameter(
                "learning_rate".to_string(),
                format!("must be positive and finite, got {}", self.learning_rate),
            ));
        }
        if let OptimizerConfig::Adam { beta1, beta2, epsilon } = self.optimizer {
            for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                if !(0.0..1.0).contains(&beta) {
                    return Err(DqnError::invalid_parameter(
                        name.to_string(),
                        format!("must lie in [0, 1), got {}", beta),
                    ));
                }
            }
            if !(epsilon > 0.0) {
                return Err(DqnError::invalid_parameter(
                    "epsilon".to_string(),
                    format!("must be positive, got {}", epsilon),
                ));
            }
        }
        Ok(())
    }
}

/// Complete configuration of the learning core
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DqnConfig {
    pub input_shape: InputShape,
    pub action_count: usize,
    pub device: Device,
    pub network: NetworkConfig,
    pub trainer: TrainerConfig,
    pub exploration: ExplorationConfig,
}

impl Default for DqnConfig {
    fn default() -> Self {
        DqnConfig {
            input_shape: InputShape::default(),
            action_count: 4,
            device: Device::default(),
            network: NetworkConfig::default(),
            trainer: TrainerConfig::default(),
            exploration: ExplorationConfig::default(),
        }
    }
}

impl DqnConfig {
    /// Parse and validate a JSON document; omitted fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DqnConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks the parts that do not need a network to validate.
    /// Layer-shape derivation is checked when the network is built.
    pub fn validate(&self) -> Result<()> {
        if self.action_count == 0 {
            return Err(DqnError::invalid_parameter("action_count", "must be at least 1"));
        }
        self.trainer.validate()?;
        self.exploration.validate()?;
        Ok(())
    }
}
