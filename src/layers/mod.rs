//! Building blocks of the value network.
//!
//! Layers own their parameters only. Forward passes take `&self`; the
//! training variants hand back a cache that the caller passes to
//! `backward`, so nothing is retained inside a layer between calls.

pub mod conv;
pub mod dense;
pub mod initialization;

pub use conv::{Conv2DLayer, ConvCache, ConvGradients};
pub use dense::{DenseCache, DenseGradients, DenseLayer};
pub use initialization::WeightInit;
