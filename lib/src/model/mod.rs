pub mod architecture;
pub mod training;
pub mod types;
pub mod weights;

use std::fmt;

use dfdx::prelude::{Cpu, HasShape, Merge, NoneTape, Tape, TensorFromVec, TryMatMul};
use itertools::Itertools;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub use architecture::*;
pub use training::*;
pub use types::{Device, Matrix, TrainParams, DEFAULT_LEARNING_RATE};
pub use weights::*;

use crate::{
  data::{GraphBatch, Op, NODE_FEATURES},
  Error, Result,
};

/// Tapes a forward pass can run under: `NoneTape` for inference, `OwnedTape` for training.
pub trait GraphTape: Sized + Tape<f32, Cpu> + Merge<Self> + Merge<NoneTape> + Default {}

impl<T: Tape<f32, Cpu> + Merge<T> + Merge<NoneTape> + Default> GraphTape for T {}

/// Graph convolution `H' = Â (H W) + b` over a pre-normalized dense adjacency `Â`.
#[derive(Debug, Clone)]
pub struct GraphConv {
  /// `(input, output)`
  pub weight: Matrix,
  /// `(1, output)`
  pub bias: Matrix,
}

impl GraphConv {
  /// Glorot-uniform weights, zero bias.
  pub fn new(dev: &Cpu, input: usize, output: usize, rng: &mut StdRng) -> Self {
    let bound = (6.0 / (input + output) as f32).sqrt();
    let weights: Vec<f32> = (0..input * output)
      .map(|_| rng.gen_range(-bound..bound))
      .collect();
    Self {
      weight: dev.tensor_from_vec(weights, (input, output)),
      bias: dev.tensor_from_vec(vec![0.0; output], (1, output)),
    }
  }

  pub fn dims(&self) -> (usize, usize) {
    *self.weight.shape()
  }

  pub fn forward<T: GraphTape>(&self, dev: &Cpu, x: Matrix<T>, adjacency: &Matrix) -> Matrix<T> {
    let nodes = adjacency.shape().0;
    let ones: Matrix = dev.tensor_from_vec(vec![1.0; nodes], (nodes, 1));
    let h = x.matmul(self.weight.retaped::<T>());
    let h = adjacency.retaped::<T>().matmul(h);
    h + ones.retaped::<T>().matmul(self.bias.retaped::<T>())
  }
}

#[derive(Debug, Clone)]
pub enum Layer {
  Conv(GraphConv),
  Relu,
  Tanh,
}

/// Sequential GNN built from an [`Architecture`]. Produces one logit row per node.
#[derive(Debug, Clone)]
pub struct GraphNet {
  architecture: Architecture,
  layers: Vec<Layer>,
  dev: Cpu,
}

impl GraphNet {
  /// Fresh, seeded parameters. Every call yields an independent model instance.
  pub fn new(architecture: &Architecture, seed: u64) -> Result<Self> {
    architecture.validate()?;
    let dev = Cpu::default();
    let mut rng = StdRng::seed_from_u64(seed);
    let layers = architecture
      .layers
      .iter()
      .map(|spec| match *spec {
        LayerSpec::GraphConv { input, output } => {
          Layer::Conv(GraphConv::new(&dev, input, output, &mut rng))
        }
        LayerSpec::Relu => Layer::Relu,
        LayerSpec::Tanh => Layer::Tanh,
      })
      .collect();
    Ok(Self {
      architecture: architecture.clone(),
      layers,
      dev,
    })
  }

  pub fn architecture(&self) -> &Architecture {
    &self.architecture
  }

  pub fn device(&self) -> &Cpu {
    &self.dev
  }

  pub fn layers(&self) -> &[Layer] {
    &self.layers
  }

  /// Non-activation layers in order.
  pub fn convs(&self) -> impl Iterator<Item = &GraphConv> {
    self.layers.iter().filter_map(|layer| match layer {
      Layer::Conv(conv) => Some(conv),
      _ => None,
    })
  }

  pub fn convs_mut(&mut self) -> impl Iterator<Item = &mut GraphConv> {
    self.layers.iter_mut().filter_map(|layer| match layer {
      Layer::Conv(conv) => Some(conv),
      _ => None,
    })
  }

  pub fn forward<T: GraphTape>(&self, x: Matrix<T>, adjacency: &Matrix) -> Matrix<T> {
    self.layers.iter().fold(x, |h, layer| match layer {
      Layer::Conv(conv) => conv.forward(&self.dev, h, adjacency),
      Layer::Relu => h.relu(),
      Layer::Tanh => h.tanh(),
    })
  }

  /// Node features and normalized adjacency of a batch as tensors.
  pub fn inputs(&self, batch: &GraphBatch) -> (Matrix, Matrix) {
    let n = batch.num_nodes;
    let x = self
      .dev
      .tensor_from_vec(batch.features.clone(), (n, NODE_FEATURES));
    let adjacency = self.dev.tensor_from_vec(batch.normalized_adjacency(), (n, n));
    (x, adjacency)
  }

  /// Row-major `num_nodes x Op::COUNT` logits, no gradients recorded.
  pub fn predict(&self, batch: &GraphBatch) -> Vec<f32> {
    let (x, adjacency) = self.inputs(batch);
    self.forward(x, &adjacency).as_vec()
  }

}

/// Operation with the largest logit in `node`'s row of row-major `num_nodes x Op::COUNT` logits.
pub fn predicted_op(logits: &[f32], node: usize) -> Result<Op> {
  let row = logits
    .get(node * Op::COUNT..(node + 1) * Op::COUNT)
    .ok_or_else(|| {
      Error::Batch(format!(
        "node {node} is out of range for {} logit rows",
        logits.len() / Op::COUNT
      ))
    })?;
  let best = row
    .iter()
    .position_max_by(|a, b| a.total_cmp(b))
    .unwrap_or_default();
  Op::from_index(best)
}

impl fmt::Display for GraphNet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.architecture)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::{ExprGenerator, GeneratorConfig, Mask};

  fn tiny() -> Architecture {
    "conv:8:4,relu,conv:4:5".parse().unwrap()
  }

  #[test]
  fn builds_layers_in_order() {
    let net = GraphNet::new(&Architecture::default(), 0).unwrap();
    assert_eq!(net.layers().len(), 5);
    let dims = net.convs().map(GraphConv::dims).collect_vec();
    assert_eq!(dims, vec![(8, 16), (16, 16), (16, 5)]);
    assert!(matches!(net.layers()[1], Layer::Relu));
    assert!(matches!(net.layers()[3], Layer::Tanh));
  }

  #[test]
  fn seeds_control_initialization() {
    let a = GraphNet::new(&tiny(), 1).unwrap();
    let b = GraphNet::new(&tiny(), 1).unwrap();
    let c = GraphNet::new(&tiny(), 2).unwrap();
    assert_eq!(a.weight_embedding(), b.weight_embedding());
    assert_ne!(a.weight_embedding(), c.weight_embedding());
    let bound = (6.0f32 / 9.0).sqrt();
    assert!(a.weight_embedding().0.iter().all(|w| w.abs() <= bound));
  }

  #[test]
  fn invalid_architecture_is_an_error() {
    let broken = Architecture {
      layers: vec![LayerSpec::GraphConv { input: 3, output: 5 }],
    };
    assert!(GraphNet::new(&broken, 0).is_err());
  }

  #[test]
  fn forward_yields_one_row_per_node() {
    let net = GraphNet::new(&tiny(), 0).unwrap();
    let mut generator = ExprGenerator::new(GeneratorConfig::default(), 5).unwrap();
    let batch = generator.batch(3).unwrap();
    let logits = net.predict(&batch);
    assert_eq!(logits.len(), batch.num_nodes * Op::COUNT);
    assert!(logits.iter().all(|x| x.is_finite()));
    for node in batch.masked_nodes(Mask::Test) {
      predicted_op(&logits, node).unwrap();
    }
  }

  #[test]
  fn argmax_picks_largest_logit() {
    let logits = [0.1, 0.2, 0.3, 0.4, 0.5, 1.0, -1.0, 9.0, 0.0, 0.0];
    assert_eq!(predicted_op(&logits, 0).unwrap(), Op::Or);
    assert_eq!(predicted_op(&logits, 1).unwrap(), Op::Mul);
  }

  #[test]
  fn node_past_the_last_row_is_an_error() {
    let logits = [0.0; 2 * Op::COUNT];
    assert!(matches!(predicted_op(&logits, 2), Err(Error::Batch(_))));
    assert!(predicted_op(&logits[..Op::COUNT + 2], 1).is_err());
    assert!(predicted_op(&[], 0).is_err());
  }
}
