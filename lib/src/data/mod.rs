//! Synthetic expression data: random expression trees, their graph encoding and batching.
pub mod expr;
pub mod generator;
pub mod graph;

pub use expr::*;
pub use generator::*;
pub use graph::*;

/// Per-node features: `[add, sub, mul, and, or, is_operand, value, is_root]`.
pub const NODE_FEATURES: usize = 8;

pub const VALUE_FEATURE: usize = Op::COUNT + 1;
pub const OPERAND_FEATURE: usize = Op::COUNT;
pub const ROOT_FEATURE: usize = Op::COUNT + 2;
