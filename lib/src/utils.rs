use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

#[cfg(not(debug_assertions))]
use human_panic::setup_panic;
use tracing::subscriber::{DefaultGuard, SetGlobalDefaultError};

#[cfg(debug_assertions)]
extern crate better_panic;

use tracing_subscriber::EnvFilter;

// [NOTE] tracing
//
// Run milestones go to `info!`, per-epoch numbers to `debug!`.
// Set RUST_LOG=opweights=debug to watch the loss go down.

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn install_logger() -> Result<(), SetGlobalDefaultError> {
  let subscriber = tracing_subscriber::fmt()
    .compact()
    .with_env_filter(env_filter())
    .finish();
  tracing::subscriber::set_global_default(subscriber)
}

pub fn init_logging() -> Result<(), SetGlobalDefaultError> {
  // Human Panic. Only enabled when *not* debugging.
  #[cfg(not(debug_assertions))]
  {
    setup_panic!();
  }

  // Better Panic. Only enabled *when* debugging.
  #[cfg(debug_assertions)]
  {
    better_panic::Settings::debug()
      .most_recent_first(false)
      .lineno_suffix(true)
      .verbosity(better_panic::Verbosity::Full)
      .install();
  }

  install_logger()?;

  Ok(())
}

/// Thread-local subscriber for tests. Keep the guard alive for the duration of the test.
pub fn init_logging_tests() -> DefaultGuard {
  let subscriber = tracing_subscriber::fmt()
    .compact()
    .with_test_writer()
    .with_env_filter(env_filter())
    .finish();
  tracing::subscriber::set_default(subscriber)
}

pub fn serialize_to_file<T: Serialize>(path: &Path, obj: &T) -> crate::Result<()> {
  let buff = serde_json::to_string(obj)?;
  std::fs::write(path, buff)?;
  Ok(())
}

pub fn deserialize_from_file<T: DeserializeOwned>(path: &Path) -> crate::Result<T> {
  let content = std::fs::read_to_string(path)?;
  Ok(serde_json::from_str(&content)?)
}

/// `sign(v) * ln(1 + |v|)`: keeps products of small operands in a range a GNN can digest.
pub fn signed_log(value: i64) -> f32 {
  let magnitude = (value.unsigned_abs() as f64).ln_1p() as f32;
  if value < 0 {
    -magnitude
  } else {
    magnitude
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn signed_log_is_odd_and_monotone() {
    assert_eq!(signed_log(0), 0.0);
    assert!((signed_log(-5) + signed_log(5)).abs() < 1e-6);
    assert!(signed_log(3) < signed_log(4));
    assert!((signed_log(1) - std::f32::consts::LN_2).abs() < 1e-6);
  }

  #[test]
  fn json_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.json");
    let weights = vec![0.5f32, -1.25, 3.0];
    serialize_to_file(&path, &weights).unwrap();
    let back: Vec<f32> = deserialize_from_file(&path).unwrap();
    assert_eq!(back, weights);
  }
}
