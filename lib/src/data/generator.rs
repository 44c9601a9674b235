use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Expr, ExprGraph, GraphBatch, Op};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
  /// Maximum number of operator levels, root included.
  pub max_depth: usize,
  /// Operands are drawn from `0..=operand_max`.
  pub operand_max: i64,
  /// Pin the root operation; uniform over all operations when `None`.
  pub root_op: Option<Op>,
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      max_depth: 3,
      operand_max: 9,
      root_op: None,
    }
  }
}

impl GeneratorConfig {
  pub fn with_root(self, root_op: Op) -> Self {
    Self {
      root_op: Some(root_op),
      ..self
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.max_depth == 0 {
      return Err(Error::Config("max_depth must be at least 1".into()));
    }
    if self.operand_max < 0 {
      return Err(Error::Config("operand_max must not be negative".into()));
    }
    Ok(())
  }
}

/// Seeded source of random expression graphs.
pub struct ExprGenerator {
  rng: StdRng,
  config: GeneratorConfig,
}

impl ExprGenerator {
  pub fn new(config: GeneratorConfig, seed: u64) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      rng: StdRng::seed_from_u64(seed),
      config,
    })
  }

  pub fn config(&self) -> &GeneratorConfig {
    &self.config
  }

  pub fn expression(&mut self) -> Expr {
    let op = match self.config.root_op {
      Some(op) => op,
      None => self.random_op(),
    };
    let lhs = self.subtree(2);
    let rhs = self.subtree(2);
    Expr::binary(op, lhs, rhs)
  }

  fn subtree(&mut self, level: usize) -> Expr {
    if level <= self.config.max_depth && self.rng.gen_bool(0.5) {
      let op = self.random_op();
      let lhs = self.subtree(level + 1);
      let rhs = self.subtree(level + 1);
      Expr::binary(op, lhs, rhs)
    } else {
      Expr::Operand(self.rng.gen_range(0..=self.config.operand_max))
    }
  }

  fn random_op(&mut self) -> Op {
    Op::ALL[self.rng.gen_range(0..Op::COUNT)]
  }

  pub fn graph(&mut self) -> Result<ExprGraph> {
    ExprGraph::from_expr(&self.expression())
  }

  pub fn batch(&mut self, size: usize) -> Result<GraphBatch> {
    if size == 0 {
      return Err(Error::Batch("batch size must be positive".into()));
    }
    let graphs = (0..size)
      .map(|_| self.graph())
      .collect::<Result<Vec<_>>>()?;
    GraphBatch::from_graphs(&graphs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_seed_same_expressions() {
    let mut a = ExprGenerator::new(GeneratorConfig::default(), 7).unwrap();
    let mut b = ExprGenerator::new(GeneratorConfig::default(), 7).unwrap();
    for _ in 0..20 {
      assert_eq!(a.expression(), b.expression());
    }
    assert_eq!(a.batch(4).unwrap(), b.batch(4).unwrap());
  }

  #[test]
  fn respects_depth_and_operand_range() {
    let config = GeneratorConfig {
      max_depth: 2,
      operand_max: 3,
      root_op: None,
    };
    let mut generator = ExprGenerator::new(config, 1).unwrap();
    for _ in 0..200 {
      let expr = generator.expression();
      assert!(expr.depth() >= 1 && expr.depth() <= 2, "{expr}");
      assert!(expr.root_op().is_some());
      assert_operands_within(&expr, 3);
    }
  }

  fn assert_operands_within(expr: &Expr, max: i64) {
    match expr {
      Expr::Operand(v) => assert!((0..=max).contains(v)),
      Expr::Binary { lhs, rhs, .. } => {
        assert_operands_within(lhs, max);
        assert_operands_within(rhs, max);
      }
    }
  }

  #[test]
  fn pinned_root_label() {
    let config = GeneratorConfig::default().with_root(Op::Or);
    let mut generator = ExprGenerator::new(config, 3).unwrap();
    let batch = generator.batch(8).unwrap();
    for node in batch.masked_nodes(crate::data::Mask::Test) {
      assert_eq!(batch.labels[node], Some(Op::Or));
    }
  }

  #[test]
  fn all_operations_show_up_at_the_root() {
    let mut generator = ExprGenerator::new(GeneratorConfig::default(), 11).unwrap();
    let mut seen = [false; Op::COUNT];
    for _ in 0..200 {
      seen[generator.graph().unwrap().root_op().index()] = true;
    }
    assert!(seen.iter().all(|s| *s));
  }

  #[test]
  fn rejects_bad_config() {
    let config = GeneratorConfig {
      max_depth: 0,
      ..GeneratorConfig::default()
    };
    assert!(ExprGenerator::new(config, 0).is_err());
    let mut generator = ExprGenerator::new(GeneratorConfig::default(), 0).unwrap();
    assert!(generator.batch(0).is_err());
  }
}
