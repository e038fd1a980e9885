//! Regression losses for fitting action values to their targets.

mod functions;

pub use functions::{Loss, MSE};
