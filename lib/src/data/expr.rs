use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Root operation of an expression, doubling as the class label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
  Add = 0,
  Sub = 1,
  Mul = 2,
  And = 3,
  Or = 4,
}

impl Op {
  pub const COUNT: usize = 5;
  pub const ALL: [Op; Op::COUNT] = [Op::Add, Op::Sub, Op::Mul, Op::And, Op::Or];

  pub fn index(self) -> usize {
    self as usize
  }

  pub fn from_index(index: usize) -> Result<Op> {
    Op::ALL.get(index).copied().ok_or(Error::Label(index))
  }

  /// Arithmetic wraps; `and`/`or` are logical (non-zero is true) and yield 0 or 1.
  pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
    match self {
      Op::Add => lhs.wrapping_add(rhs),
      Op::Sub => lhs.wrapping_sub(rhs),
      Op::Mul => lhs.wrapping_mul(rhs),
      Op::And => (lhs != 0 && rhs != 0) as i64,
      Op::Or => (lhs != 0 || rhs != 0) as i64,
    }
  }

  pub fn symbol(self) -> &'static str {
    match self {
      Op::Add => "+",
      Op::Sub => "-",
      Op::Mul => "*",
      Op::And => "&&",
      Op::Or => "||",
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Op::Add => "add",
      Op::Sub => "sub",
      Op::Mul => "mul",
      Op::And => "and",
      Op::Or => "or",
    }
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Op {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Op::ALL
      .into_iter()
      .find(|op| op.name() == s.trim().to_ascii_lowercase())
      .ok_or_else(|| Error::Config(format!("unknown operation {s:?}")))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Operand(i64),
  Binary { op: Op, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
  pub fn binary(op: Op, lhs: Expr, rhs: Expr) -> Self {
    Expr::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn eval(&self) -> i64 {
    match self {
      Expr::Operand(value) => *value,
      Expr::Binary { op, lhs, rhs } => op.apply(lhs.eval(), rhs.eval()),
    }
  }

  /// `None` for a bare operand.
  pub fn root_op(&self) -> Option<Op> {
    match self {
      Expr::Operand(_) => None,
      Expr::Binary { op, .. } => Some(*op),
    }
  }

  pub fn node_count(&self) -> usize {
    match self {
      Expr::Operand(_) => 1,
      Expr::Binary { lhs, rhs, .. } => 1 + lhs.node_count() + rhs.node_count(),
    }
  }

  pub fn depth(&self) -> usize {
    match self {
      Expr::Operand(_) => 0,
      Expr::Binary { lhs, rhs, .. } => 1 + lhs.depth().max(rhs.depth()),
    }
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Operand(value) => write!(f, "{value}"),
      Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ops_evaluate() {
    assert_eq!(Op::Add.apply(3, 4), 7);
    assert_eq!(Op::Sub.apply(3, 4), -1);
    assert_eq!(Op::Mul.apply(3, 4), 12);
    assert_eq!(Op::And.apply(3, 0), 0);
    assert_eq!(Op::And.apply(3, 4), 1);
    assert_eq!(Op::Or.apply(0, 0), 0);
    assert_eq!(Op::Or.apply(0, 2), 1);
    assert_eq!(Op::Mul.apply(i64::MAX, 2), -2);
  }

  #[test]
  fn label_indices_match_declaration_order() {
    for (i, op) in Op::ALL.iter().enumerate() {
      assert_eq!(op.index(), i);
      assert_eq!(Op::from_index(i).unwrap(), *op);
      assert_eq!(op.name().parse::<Op>().unwrap(), *op);
    }
    assert!(matches!(Op::from_index(5), Err(Error::Label(5))));
    assert!("div".parse::<Op>().is_err());
  }

  #[test]
  fn nested_expression() {
    // (2 + 3) * (4 || 0)
    let expr = Expr::binary(
      Op::Mul,
      Expr::binary(Op::Add, Expr::Operand(2), Expr::Operand(3)),
      Expr::binary(Op::Or, Expr::Operand(4), Expr::Operand(0)),
    );
    assert_eq!(expr.eval(), 5);
    assert_eq!(expr.root_op(), Some(Op::Mul));
    assert_eq!(expr.node_count(), 7);
    assert_eq!(expr.depth(), 2);
    assert_eq!(expr.to_string(), "((2 + 3) * (4 || 0))");
  }
}
