use std::{fmt, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
  data::{Op, NODE_FEATURES},
  Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
  GraphConv { input: usize, output: usize },
  Relu,
  Tanh,
}

impl LayerSpec {
  pub fn is_activation(&self) -> bool {
    !matches!(self, LayerSpec::GraphConv { .. })
  }

  /// Weight scalars of the layer (bias excluded).
  pub fn weight_count(&self) -> usize {
    match self {
      LayerSpec::GraphConv { input, output } => input * output,
      _ => 0,
    }
  }
}

impl fmt::Display for LayerSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LayerSpec::GraphConv { input, output } => write!(f, "GraphConv({input}, {output})"),
      LayerSpec::Relu => write!(f, "ReLU()"),
      LayerSpec::Tanh => write!(f, "Tanh()"),
    }
  }
}

/// Ordered stack of graph convolutions and activations.
///
/// Parses from the compact form `conv:8:16,relu,conv:16:5` and (de)serializes as a list of
/// `{kind: graph_conv, input, output}` / `{kind: relu}` / `{kind: tanh}` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Architecture {
  pub layers: Vec<LayerSpec>,
}

impl Default for Architecture {
  fn default() -> Self {
    Self {
      layers: vec![
        LayerSpec::GraphConv {
          input: NODE_FEATURES,
          output: 16,
        },
        LayerSpec::Relu,
        LayerSpec::GraphConv {
          input: 16,
          output: 16,
        },
        LayerSpec::Tanh,
        LayerSpec::GraphConv {
          input: 16,
          output: Op::COUNT,
        },
      ],
    }
  }
}

impl Architecture {
  pub fn new(layers: Vec<LayerSpec>) -> Result<Self> {
    let architecture = Self { layers };
    architecture.validate()?;
    Ok(architecture)
  }

  pub fn validate(&self) -> Result<()> {
    let mut expected = NODE_FEATURES;
    let mut convs = 0;
    for (position, layer) in self.layers.iter().enumerate() {
      if let LayerSpec::GraphConv { input, output } = *layer {
        if input != expected {
          return Err(Error::Architecture(format!(
            "layer {position} takes {input} features but receives {expected}"
          )));
        }
        if output == 0 {
          return Err(Error::Architecture(format!("layer {position} has no outputs")));
        }
        expected = output;
        convs += 1;
      }
    }
    if convs == 0 {
      return Err(Error::Architecture("no graph convolution layers".into()));
    }
    if expected != Op::COUNT {
      return Err(Error::Architecture(format!(
        "network ends with {expected} outputs, expected {}",
        Op::COUNT
      )));
    }
    Ok(())
  }

  /// Length of the weight embedding: all weight scalars of non-activation layers.
  pub fn embedding_len(&self) -> usize {
    self.layers.iter().map(LayerSpec::weight_count).sum()
  }

  /// Weights plus biases.
  pub fn parameter_count(&self) -> usize {
    self
      .layers
      .iter()
      .map(|layer| match layer {
        LayerSpec::GraphConv { input, output } => input * output + output,
        _ => 0,
      })
      .sum()
  }
}

impl fmt::Display for Architecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Sequential(")?;
    for (i, layer) in self.layers.iter().enumerate() {
      writeln!(f, "  ({i}): {layer}")?;
    }
    write!(f, ")")
  }
}

impl FromStr for Architecture {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let layers = s
      .split(',')
      .map(str::trim)
      .filter(|part| !part.is_empty())
      .map(parse_layer)
      .collect::<Result<Vec<_>>>()?;
    Architecture::new(layers)
  }
}

fn parse_layer(part: &str) -> Result<LayerSpec> {
  let fields = part.split(':').map(str::trim).collect_vec();
  match fields.as_slice() {
    ["relu"] => Ok(LayerSpec::Relu),
    ["tanh"] => Ok(LayerSpec::Tanh),
    ["conv", input, output] => {
      let dim = |value: &str| {
        value
          .parse::<usize>()
          .map_err(|_| Error::Architecture(format!("bad dimension {value:?} in {part:?}")))
      };
      Ok(LayerSpec::GraphConv {
        input: dim(*input)?,
        output: dim(*output)?,
      })
    }
    _ => Err(Error::Architecture(format!("unknown layer {part:?}"))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_is_valid() {
    let architecture = Architecture::default();
    architecture.validate().unwrap();
    assert_eq!(architecture.embedding_len(), 8 * 16 + 16 * 16 + 16 * 5);
    assert_eq!(architecture.parameter_count(), architecture.embedding_len() + 16 + 16 + 5);
  }

  #[test]
  fn parses_compact_form() {
    let architecture: Architecture = "conv:8:4, relu, conv:4:5, tanh".parse().unwrap();
    assert_eq!(
      architecture.layers,
      vec![
        LayerSpec::GraphConv { input: 8, output: 4 },
        LayerSpec::Relu,
        LayerSpec::GraphConv { input: 4, output: 5 },
        LayerSpec::Tanh,
      ]
    );
    assert_eq!(architecture.embedding_len(), 52);
  }

  #[test]
  fn rejects_broken_chains() {
    assert!("conv:7:5".parse::<Architecture>().is_err());
    assert!("conv:8:4,conv:3:5".parse::<Architecture>().is_err());
    assert!("conv:8:4".parse::<Architecture>().is_err());
    assert!("relu".parse::<Architecture>().is_err());
    assert!("conv:8:x".parse::<Architecture>().is_err());
    assert!("dense:8:5".parse::<Architecture>().is_err());
  }

  #[test]
  fn serde_uses_tagged_layers() {
    let json = r#"[{"kind":"graph_conv","input":8,"output":5},{"kind":"relu"}]"#;
    let architecture: Architecture = serde_json::from_str(json).unwrap();
    assert_eq!(architecture.layers.len(), 2);
    assert_eq!(serde_json::to_string(&architecture).unwrap(), json);
  }

  #[test]
  fn displays_like_a_sequential() {
    let text = Architecture::default().to_string();
    assert!(text.starts_with("Sequential("));
    assert!(text.contains("(1): ReLU()"));
    assert!(text.contains("(4): GraphConv(16, 5)"));
  }
}
