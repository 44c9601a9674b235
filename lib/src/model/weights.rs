use dfdx::prelude::*;
use serde::{Deserialize, Serialize};

use super::GraphNet;
use crate::{Error, Result};

/// Flattened weights of a trained model: every non-activation layer's weight matrix,
/// row-major, concatenated in layer order. Biases are not included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightEmbedding(pub Vec<f32>);

impl WeightEmbedding {
  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.0
  }
}

impl GraphNet {
  pub fn weight_embedding(&self) -> WeightEmbedding {
    WeightEmbedding(self.convs().flat_map(|conv| conv.weight.as_vec()).collect())
  }

  /// Rebuild a model whose weights are taken from an embedding. Biases start at zero.
  pub fn from_embedding(
    architecture: &super::Architecture,
    embedding: &WeightEmbedding,
  ) -> Result<Self> {
    if embedding.len() != architecture.embedding_len() {
      return Err(Error::Architecture(format!(
        "embedding has {} weights, architecture needs {}",
        embedding.len(),
        architecture.embedding_len()
      )));
    }
    let mut net = GraphNet::new(architecture, 0)?;
    let dev = net.device().clone();
    let mut rest = embedding.as_slice();
    for conv in net.convs_mut() {
      let (input, output) = conv.dims();
      let (chunk, tail) = rest.split_at(input * output);
      conv.weight = dev.tensor_from_vec(chunk.to_vec(), (input, output));
      conv.bias = dev.tensor_from_vec(vec![0.0; output], (1, output));
      rest = tail;
    }
    Ok(net)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Architecture;

  #[test]
  fn length_matches_architecture() {
    for spec in ["conv:8:5", "conv:8:3,tanh,conv:3:5", "conv:8:16,relu,conv:16:16,relu,conv:16:5"] {
      let architecture: Architecture = spec.parse().unwrap();
      let net = GraphNet::new(&architecture, 3).unwrap();
      assert_eq!(net.weight_embedding().len(), architecture.embedding_len());
    }
  }

  #[test]
  fn layer_order_is_preserved() {
    let architecture: Architecture = "conv:8:2,relu,conv:2:5".parse().unwrap();
    let values: Vec<f32> = (0..architecture.embedding_len()).map(|i| i as f32).collect();
    let net = GraphNet::from_embedding(&architecture, &WeightEmbedding(values.clone())).unwrap();
    let convs: Vec<_> = net.convs().collect();
    assert_eq!(convs[0].weight.as_vec(), values[..16].to_vec());
    assert_eq!(convs[1].weight.as_vec(), values[16..].to_vec());
    assert_eq!(net.weight_embedding().0, values);
  }

  #[test]
  fn wrong_length_is_rejected() {
    let architecture = Architecture::default();
    assert!(GraphNet::from_embedding(&architecture, &WeightEmbedding(vec![0.0; 3])).is_err());
  }
}
