//! # Activation Functions Module
//!
//! Non-linearities used by the value network. Every hidden stage of the
//! network is rectified-linear; the output layer is linear so Q-values keep
//! their sign and magnitude.
//!
//! ## Usage Example
//!
//! ```rust
//! use deepq::activations::Activation;
//! use ndarray::array;
//!
//! let mut data = array![1.0, -0.5, 0.0, 2.0];
//! Activation::Relu.apply(&mut data);
//! assert_eq!(data, array![1.0, 0.0, 0.0, 2.0]);
//! ```

pub mod functions;

pub use functions::Activation;
