use std::path::{Path, PathBuf};

use opweights::{
  data::GeneratorConfig,
  model::{Architecture, Device, TrainParams},
};
use serde::Deserialize;

/// Config file format. Every field is optional; command-line flags win over the file.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
  pub architecture: Option<Architecture>,
  pub epochs: Option<usize>,
  pub batch_size: Option<usize>,
  pub learning_rate: Option<f32>,
  pub device: Option<Device>,
  pub seed: Option<u64>,
  pub data_dir: Option<PathBuf>,
  pub max_depth: Option<usize>,
  pub operand_max: Option<i64>,
}

impl AppConfig {
  pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
  }

  // merge configs where the second overwrites the first
  pub fn merge(self, other: Self) -> Self {
    Self {
      architecture: other.architecture.or(self.architecture),
      epochs: other.epochs.or(self.epochs),
      batch_size: other.batch_size.or(self.batch_size),
      learning_rate: other.learning_rate.or(self.learning_rate),
      device: other.device.or(self.device),
      seed: other.seed.or(self.seed),
      data_dir: other.data_dir.or(self.data_dir),
      max_depth: other.max_depth.or(self.max_depth),
      operand_max: other.operand_max.or(self.operand_max),
    }
  }

  pub fn architecture(&self) -> Architecture {
    self.architecture.clone().unwrap_or_default()
  }

  pub fn train_params(&self) -> TrainParams {
    let defaults = TrainParams::default();
    TrainParams {
      epochs: self.epochs.unwrap_or(defaults.epochs),
      batch_size: self.batch_size.unwrap_or(defaults.batch_size),
      device: self.device.unwrap_or(defaults.device),
      learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
      seed: self.seed.unwrap_or(defaults.seed),
    }
  }

  pub fn generator(&self) -> GeneratorConfig {
    let defaults = GeneratorConfig::default();
    GeneratorConfig {
      max_depth: self.max_depth.unwrap_or(defaults.max_depth),
      operand_max: self.operand_max.unwrap_or(defaults.operand_max),
      root_op: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_config_wins() {
    let file = AppConfig {
      epochs: Some(10),
      batch_size: Some(8),
      ..AppConfig::default()
    };
    let flags = AppConfig {
      epochs: Some(3),
      ..AppConfig::default()
    };
    let merged = file.merge(flags);
    assert_eq!(merged.epochs, Some(3));
    assert_eq!(merged.batch_size, Some(8));
    assert_eq!(merged.train_params().learning_rate, 0.01);
  }

  #[test]
  fn parses_yaml() {
    let yaml = r#"
architecture:
  - kind: graph_conv
    input: 8
    output: 4
  - kind: relu
  - kind: graph_conv
    input: 4
    output: 5
epochs: 50
device: cuda
max_depth: 2
"#;
    let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.architecture().embedding_len(), 52);
    assert_eq!(config.train_params().epochs, 50);
    assert_eq!(config.train_params().device, Device::Cuda);
    assert_eq!(config.generator().max_depth, 2);
    assert!(serde_yaml::from_str::<AppConfig>("epoch: 3").is_err());
  }
}
