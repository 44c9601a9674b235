pub mod archive;
pub mod data;
pub mod model;
pub mod subcommands;
pub mod utils;

use thiserror::Error;

pub use data::Op;

#[derive(Error, Debug)]
pub enum Error {
  #[error("invalid architecture: {0}")]
  Architecture(String),
  #[error("label index {0} is not an operation (expected 0..5)")]
  Label(usize),
  #[error("invalid batch: {0}")]
  Batch(String),
  #[error("invalid configuration: {0}")]
  Config(String),
  #[error("malformed shard: {0}")]
  Shard(String),
  #[error("tensor backend: {0}")]
  Backend(#[from] dfdx::tensor::CpuError),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
