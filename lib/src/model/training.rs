use std::{fmt, time::Instant};

use dfdx::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{predicted_op, Architecture, GraphNet, GraphTape, Matrix, WeightEmbedding};
use super::types::{Device, TrainParams};
use crate::{
  data::{ExprGenerator, GeneratorConfig, Mask, Op},
  Error, Result,
};

/// Single-graph trials run after training.
pub const EVAL_TRIALS: usize = 10;

/// Keeps the data stream independent of parameter initialization under one seed.
const DATA_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

pub fn data_seed(seed: u64) -> u64 {
  seed ^ DATA_SEED_MIX
}

/// Mean cross-entropy over the rows selected by `targets`. Rows of zeros contribute nothing,
/// so a one-hot target matrix restricted to a mask doubles as the mask itself.
pub fn masked_cross_entropy<T: GraphTape>(
  logits: Matrix<T>,
  targets: &Matrix,
  count: usize,
) -> Tensor<Rank0, f32, Cpu, T> {
  let log_probs = logits.log_softmax::<Axis<1>>();
  (log_probs * targets.clone()).sum::<Rank0, _>() * (-1.0 / count as f32)
}

/// Adam over the weight and bias of every graph convolution, stepped by dfdx's Adam kernel.
/// Moments live in leaky `Gradients` keyed by parameter id, as in `dfdx::optim::Adam`.
pub struct GraphAdam {
  config: AdamConfig,
  t: i32,
  moment1: Gradients<f32, Cpu>,
  moment2: Gradients<f32, Cpu>,
}

impl GraphAdam {
  /// betas 0.9/0.999, eps 1e-8, no weight decay.
  pub fn new(learning_rate: f32) -> Self {
    Self {
      config: AdamConfig {
        lr: learning_rate.into(),
        ..Default::default()
      },
      t: 0,
      moment1: Gradients::leaky(),
      moment2: Gradients::leaky(),
    }
  }

  pub fn config(&self) -> &AdamConfig {
    &self.config
  }

  pub fn step(&mut self, net: &mut GraphNet, grads: &mut Gradients<f32, Cpu>) -> Result<()> {
    self.t += 1;
    for conv in net.convs_mut() {
      self.update(&mut conv.weight, grads)?;
      self.update(&mut conv.bias, grads)?;
    }
    Ok(())
  }

  fn update(&mut self, param: &mut Matrix, grads: &mut Gradients<f32, Cpu>) -> Result<()> {
    let grad = grads.get_or_alloc_mut(&*param)?;
    let moment1 = self.moment1.get_or_alloc_mut(&*param)?;
    let moment2 = self.moment2.get_or_alloc_mut(&*param)?;
    self
      .config
      .try_update(self.t, param, moment1, moment2, grad)?;
    Ok(())
  }
}

pub struct ExponentialAverage {
  beta: f32,
  moment: f32,
  pub value: f32,
  t: i32,
}

impl ExponentialAverage {
  pub fn new(initial: f32) -> Self {
    ExponentialAverage {
      beta: 0.9,
      moment: 0.,
      value: initial,
      t: 0,
    }
  }

  pub fn update(&mut self, value: f32) {
    self.t += 1;
    self.moment = self.beta * self.moment + (1. - self.beta) * value;
    // bias correction
    self.value = self.moment / (1. - f32::powi(self.beta, self.t));
  }
}

/// One forward/backward/optimize step on a batch. Returns the loss before the update.
pub fn train_step(
  net: &mut GraphNet,
  optimizer: &mut GraphAdam,
  batch: &crate::data::GraphBatch,
) -> Result<f32> {
  let count = batch.labeled_count(Mask::Train);
  if count == 0 {
    return Err(Error::Batch("no labeled nodes in the training mask".into()));
  }
  let (x, adjacency) = net.inputs(batch);
  let targets = net
    .device()
    .tensor_from_vec(batch.one_hot_targets(Mask::Train), (batch.num_nodes, Op::COUNT));
  let logits = net.forward(x.leaky_traced(), &adjacency);
  let loss = masked_cross_entropy(logits, &targets, count);
  let value = loss.array();
  let mut grads = loss.backward();
  optimizer.step(net, &mut grads)?;
  Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trial {
  pub predicted: Op,
  pub actual: Op,
}

impl Trial {
  pub fn is_correct(&self) -> bool {
    self.predicted == self.actual
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvalReport {
  pub trials: Vec<Trial>,
}

impl EvalReport {
  pub fn correct(&self) -> usize {
    self.trials.iter().filter(|trial| trial.is_correct()).count()
  }

  pub fn total(&self) -> usize {
    self.trials.len()
  }

  /// Percentage in `[0, 100]`.
  pub fn accuracy(&self) -> f32 {
    if self.trials.is_empty() {
      return 0.0;
    }
    self.correct() as f32 / self.total() as f32 * 100.0
  }
}

impl fmt::Display for EvalReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{} correct predictions, {:.2}% accuracy",
      self.correct(),
      self.total(),
      self.accuracy()
    )
  }
}

/// Classify the root of `trials` freshly generated single-expression graphs.
pub fn evaluate(net: &GraphNet, generator: &mut ExprGenerator, trials: usize) -> Result<EvalReport> {
  let mut report = EvalReport::default();
  for _ in 0..trials {
    let batch = generator.batch(1)?;
    let logits = net.predict(&batch);
    let roots = batch.masked_nodes(Mask::Test);
    let [root] = roots.as_slice() else {
      return Err(Error::Batch(format!("expected one test node, found {}", roots.len())));
    };
    let actual = batch.labels[*root]
      .ok_or_else(|| Error::Batch("test node carries no label".into()))?;
    let trial = Trial {
      predicted: predicted_op(&logits, *root)?,
      actual,
    };
    if trial.is_correct() {
      info!("✓ correct -> Pred: {} | Real: {}", trial.predicted, trial.actual);
    } else {
      info!("× incorrect -> Pred: {} | Real: {}", trial.predicted, trial.actual);
    }
    report.trials.push(trial);
  }
  Ok(report)
}

/// Train `net` for `params.epochs` steps on batches from `generator`, then evaluate it.
#[tracing::instrument(skip_all, fields(epochs = params.epochs, batch_size = params.batch_size))]
pub fn train_model(
  net: &mut GraphNet,
  params: &TrainParams,
  generator: &mut ExprGenerator,
) -> Result<EvalReport> {
  if params.device == Device::Cuda {
    warn!("no cuda backend compiled in, training on cpu");
  }
  debug!("[[ Network Architecture ]]\n{}", net);

  let mut optimizer = GraphAdam::new(params.learning_rate);
  let mut loss_avg = ExponentialAverage::new(1.0);
  let start = Instant::now();
  for epoch in 0..params.epochs {
    let batch = generator.batch(params.batch_size)?;
    let loss = train_step(net, &mut optimizer, &batch)?;
    loss_avg.update(loss);
    debug!(epoch, loss, smoothed = loss_avg.value, "training");
  }
  if params.epochs > 0 {
    info!(
      "{} epochs took {:.2}s, {}µs / epoch, final loss {:.4}",
      params.epochs,
      start.elapsed().as_secs_f32(),
      start.elapsed().as_micros() / params.epochs as u128,
      loss_avg.value
    );
  }

  let report = evaluate(net, generator, EVAL_TRIALS)?;
  info!("[ test results ] {}", report);
  Ok(report)
}

pub struct TrainedExpression {
  pub net: GraphNet,
  pub embedding: WeightEmbedding,
  pub report: EvalReport,
}

/// Train a fresh model on expressions whose root operation is `label` and harvest its weights.
pub fn train_expression(
  architecture: &Architecture,
  params: &TrainParams,
  generator: &GeneratorConfig,
  label: Op,
) -> Result<TrainedExpression> {
  let mut net = GraphNet::new(architecture, params.seed)?;
  let mut generator = ExprGenerator::new(generator.clone().with_root(label), data_seed(params.seed))?;
  let report = train_model(&mut net, params, &mut generator)?;
  let embedding = net.weight_embedding();
  Ok(TrainedExpression {
    net,
    embedding,
    report,
  })
}
