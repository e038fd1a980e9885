//! # deepq - Convolutional Deep Q-Network learning core
//!
//! deepq contains the learning side of a DQN agent: a convolutional value
//! network over stacked frames, the temporal-difference target construction
//! that trains it, and the exploration schedule that decides how often the
//! agent acts at random. Replay memory, the environment and the outer loop
//! belong to the caller.
//!
//! ## Key Features
//!
//! - **Value Network**: three valid convolutions, a ReLU hidden layer and a
//!   linear head, with layer shapes derived and checked at construction
//! - **Targets**: the online network picks the next action, the target
//!   network values it; terminal transitions drop the bootstrap term
//! - **Training**: mean-squared error, gradients into the online network only,
//!   SGD or Adam
//! - **Exploration**: linear and exponential epsilon schedules
//! - **Preprocessing**: scaling, bilinear resizing and frame stacking
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deepq::batch::Batch;
//! use deepq::config::DqnConfig;
//! use deepq::network::ValueNetwork;
//! use deepq::trainer::Trainer;
//!
//! # fn main() -> deepq::error::Result<()> {
//! let config = DqnConfig::default();
//! let online = ValueNetwork::new(config.input_shape, config.action_count, config.network.clone(), config.device)?;
//! let mut target = online.clone();
//! let mut trainer = Trainer::new(online, config.trainer)?;
//!
//! # let batch = Batch::default();
//! // `batch` comes from the caller's replay memory
//! let loss = trainer.train_step(&batch, &target)?;
//! trainer.sync_target(&mut target)?;
//! # let _ = loss;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - ReLU and identity activations
//! - [`batch`] - Transitions and training batches
//! - [`config`] - Serde configuration with defaults and validation
//! - [`device`] - Compute placement handle
//! - [`error`] - Error types and result handling
//! - [`exploration`] - Epsilon schedules and epsilon-greedy selection
//! - [`layers`] - Convolution and dense layers, weight initialisation
//! - [`logging`] - `env_logger` setup
//! - [`loss`] - Loss functions for training
//! - [`network`] - The value network and the predictor trait
//! - [`optimizer`] - Optimization algorithms
//! - [`preprocess`] - Raw frames to observations
//! - [`target`] - TD target construction
//! - [`trainer`] - One optimization step of the online network

pub mod activations;
pub mod batch;
pub mod config;
pub mod device;
pub mod error;
pub mod exploration;
pub mod layers;
pub mod logging;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod preprocess;
pub mod target;
pub mod trainer;

pub use batch::{Batch, Observation, Transition};
pub use config::{DqnConfig, InputShape, NetworkConfig, TrainerConfig};
pub use device::Device;
pub use error::{DqnError, Result};
pub use exploration::{DecayPolicy, EpsilonGreedy, ExplorationConfig};
pub use network::{ActionValuePredictor, ValueNetwork};
pub use preprocess::{FrameStack, Preprocessor};
pub use trainer::Trainer;

#[cfg(test)]
mod tests;
