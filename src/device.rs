//! Compute placement for tensor work.
//!
//! A [`Device`] is chosen once when a network is constructed and every
//! tensor-producing call of that network runs on it. Networks that take part
//! in the same training step must agree on their device.

use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};

/// Where convolution and dense work is executed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Single host thread
    #[default]
    Cpu,
    /// Host threads; examples of a batch are spread over the rayon pool
    CpuParallel,
}

impl Device {
    pub fn is_parallel(&self) -> bool {
        matches!(self, Device::CpuParallel)
    }

    /// Fails with [`DqnError::DeviceMismatch`] unless `other` is the same device
    pub fn ensure_same(&self, other: Device) -> Result<()> {
        if *self == other {
            Ok(())
        } else {
            Err(DqnError::DeviceMismatch {
                expected: *self,
                actual: other,
            })
        }
    }
}
