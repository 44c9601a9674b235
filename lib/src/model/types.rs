use std::{fmt, str::FromStr};

use dfdx::prelude::{Cpu, NoneTape, Tensor};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Node-major 2-D tensor with runtime dimensions.
pub type Matrix<T = NoneTape> = Tensor<(usize, usize), f32, Cpu, T>;

pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Where training should run. Only the CPU backend is compiled in; `cuda` falls back to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
  #[default]
  Cpu,
  Cuda,
}

impl fmt::Display for Device {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Device::Cpu => f.write_str("cpu"),
      Device::Cuda => f.write_str("cuda"),
    }
  }
}

impl FromStr for Device {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Error> {
    match s.trim().to_ascii_lowercase().as_str() {
      "cpu" => Ok(Device::Cpu),
      "cuda" | "gpu" => Ok(Device::Cuda),
      other => Err(Error::Config(format!("unknown device {other:?}"))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
  /// One fresh batch per epoch.
  pub epochs: usize,
  pub batch_size: usize,
  pub device: Device,
  pub learning_rate: f32,
  /// Seeds both parameter initialization and the data stream.
  pub seed: u64,
}

impl Default for TrainParams {
  fn default() -> Self {
    Self {
      epochs: 200,
      batch_size: 32,
      device: Device::Cpu,
      learning_rate: DEFAULT_LEARNING_RATE,
      seed: 0,
    }
  }
}
