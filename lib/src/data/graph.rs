use std::fmt;

use itertools::Itertools;
use petgraph::{
  graph::{DiGraph, NodeIndex},
  visit::EdgeRef,
};
use petgraph_graphml::GraphMl;

use super::{Expr, Op, NODE_FEATURES, OPERAND_FEATURE, ROOT_FEATURE, VALUE_FEATURE};
use crate::{utils::signed_log, Error, Result};

/// A node of the expression tree together with the value its subtree evaluates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprNode {
  /// `None` for operands.
  pub op: Option<Op>,
  pub value: i64,
}

impl fmt::Display for ExprNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.op {
      Some(op) => write!(f, "{} = {}", op.symbol(), self.value),
      None => write!(f, "{}", self.value),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mask {
  /// Every operator node.
  Train,
  /// The root node only.
  Test,
}

/// Expression tree as a graph. Nodes are stored in pre-order, so the root is node 0.
#[derive(Debug, Clone)]
pub struct ExprGraph {
  pub tree: DiGraph<ExprNode, ()>,
  pub root: NodeIndex,
}

impl ExprGraph {
  pub fn from_expr(expr: &Expr) -> Result<Self> {
    if expr.root_op().is_none() {
      return Err(Error::Batch("expression root must be an operation".into()));
    }
    let mut tree = DiGraph::with_capacity(expr.node_count(), expr.node_count() - 1);
    let root = Self::insert(&mut tree, expr);
    Ok(ExprGraph { tree, root })
  }

  fn insert(tree: &mut DiGraph<ExprNode, ()>, expr: &Expr) -> NodeIndex {
    let node = tree.add_node(ExprNode {
      op: expr.root_op(),
      value: expr.eval(),
    });
    if let Expr::Binary { lhs, rhs, .. } = expr {
      let lhs = Self::insert(tree, lhs);
      let rhs = Self::insert(tree, rhs);
      tree.add_edge(node, lhs, ());
      tree.add_edge(node, rhs, ());
    }
    node
  }

  pub fn num_nodes(&self) -> usize {
    self.tree.node_count()
  }

  pub fn root_op(&self) -> Op {
    // from_expr guarantees an operator root
    self.tree[self.root].op.unwrap_or(Op::Add)
  }

  /// Row-major `num_nodes x NODE_FEATURES`. The root's operation one-hot is left blank.
  pub fn features(&self) -> Vec<f32> {
    let mut features = vec![0.0; self.num_nodes() * NODE_FEATURES];
    for idx in self.tree.node_indices() {
      let node = &self.tree[idx];
      let row = &mut features[idx.index() * NODE_FEATURES..(idx.index() + 1) * NODE_FEATURES];
      match node.op {
        Some(_) if idx == self.root => row[ROOT_FEATURE] = 1.0,
        Some(op) => row[op.index()] = 1.0,
        None => row[OPERAND_FEATURE] = 1.0,
      }
      row[VALUE_FEATURE] = signed_log(node.value);
    }
    features
  }

  /// Both directions of every tree edge.
  pub fn edges(&self) -> Vec<(usize, usize)> {
    self
      .tree
      .edge_references()
      .flat_map(|e| {
        let (a, b) = (e.source().index(), e.target().index());
        [(a, b), (b, a)]
      })
      .collect()
  }

  pub fn labels(&self) -> Vec<Option<Op>> {
    self.tree.node_weights().map(|node| node.op).collect()
  }

  pub fn mask(&self, mask: Mask) -> Vec<bool> {
    self
      .tree
      .node_indices()
      .map(|idx| match mask {
        Mask::Train => self.tree[idx].op.is_some(),
        Mask::Test => idx == self.root,
      })
      .collect()
  }

  pub fn graphml(&self) -> String {
    GraphMl::new(&self.tree)
      .pretty_print(true)
      .export_node_weights_display()
      .to_string()
  }
}

/// Several expression graphs joined into one disjoint graph, the way a graph loader batches them.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBatch {
  pub num_graphs: usize,
  pub num_nodes: usize,
  pub features: Vec<f32>,
  pub edges: Vec<(usize, usize)>,
  pub labels: Vec<Option<Op>>,
  pub train_mask: Vec<bool>,
  pub test_mask: Vec<bool>,
}

impl GraphBatch {
  pub fn from_graphs(graphs: &[ExprGraph]) -> Result<Self> {
    if graphs.is_empty() {
      return Err(Error::Batch("a batch needs at least one graph".into()));
    }
    let mut batch = GraphBatch {
      num_graphs: graphs.len(),
      num_nodes: 0,
      features: Vec::new(),
      edges: Vec::new(),
      labels: Vec::new(),
      train_mask: Vec::new(),
      test_mask: Vec::new(),
    };
    for graph in graphs {
      let offset = batch.num_nodes;
      batch.features.extend(graph.features());
      batch
        .edges
        .extend(graph.edges().into_iter().map(|(a, b)| (a + offset, b + offset)));
      batch.labels.extend(graph.labels());
      batch.train_mask.extend(graph.mask(Mask::Train));
      batch.test_mask.extend(graph.mask(Mask::Test));
      batch.num_nodes += graph.num_nodes();
    }
    Ok(batch)
  }

  pub fn mask(&self, mask: Mask) -> &[bool] {
    match mask {
      Mask::Train => &self.train_mask,
      Mask::Test => &self.test_mask,
    }
  }

  pub fn masked_nodes(&self, mask: Mask) -> Vec<usize> {
    self.mask(mask).iter().positions(|selected| *selected).collect()
  }

  /// Dense `D^-1/2 (A + I) D^-1/2`, row-major `num_nodes x num_nodes`. Symmetric.
  pub fn normalized_adjacency(&self) -> Vec<f32> {
    let n = self.num_nodes;
    let mut adjacency = vec![0.0f32; n * n];
    for i in 0..n {
      adjacency[i * n + i] = 1.0;
    }
    for &(a, b) in &self.edges {
      adjacency[a * n + b] = 1.0;
    }
    let inv_sqrt_degree: Vec<f32> = (0..n)
      .map(|i| adjacency[i * n..(i + 1) * n].iter().sum::<f32>().sqrt().recip())
      .collect();
    for i in 0..n {
      for j in 0..n {
        adjacency[i * n + j] *= inv_sqrt_degree[i] * inv_sqrt_degree[j];
      }
    }
    adjacency
  }

  /// Row-major `num_nodes x Op::COUNT` one-hot labels; rows outside the mask are all zero.
  pub fn one_hot_targets(&self, mask: Mask) -> Vec<f32> {
    let mut targets = vec![0.0; self.num_nodes * Op::COUNT];
    for (node, (label, selected)) in self.labels.iter().zip(self.mask(mask)).enumerate() {
      if let (Some(op), true) = (label, selected) {
        targets[node * Op::COUNT + op.index()] = 1.0;
      }
    }
    targets
  }

  /// Number of masked nodes carrying a label.
  pub fn labeled_count(&self, mask: Mask) -> usize {
    self
      .labels
      .iter()
      .zip(self.mask(mask))
      .filter(|(label, selected)| label.is_some() && **selected)
      .count()
  }
}
