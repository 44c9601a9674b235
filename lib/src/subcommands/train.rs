use std::path::PathBuf;

use tracing::info;

use crate::{
  data::{ExprGenerator, GeneratorConfig},
  model::{data_seed, train_model, Architecture, EvalReport, GraphNet, TrainParams},
  utils::serialize_to_file,
  Result,
};

/// Train a single model on expressions with random root operations and report its accuracy.
pub struct Train {
  architecture: Architecture,
  params: TrainParams,
  generator: GeneratorConfig,
  weights_output_path: Option<PathBuf>,
}

impl Train {
  pub fn new(
    architecture: Architecture,
    params: TrainParams,
    generator: GeneratorConfig,
    weights_output_path: Option<PathBuf>,
  ) -> Self {
    Self {
      architecture,
      params,
      generator,
      weights_output_path,
    }
  }

  #[tracing::instrument(skip_all, fields(seed = self.params.seed))]
  pub fn run(self) -> Result<EvalReport> {
    let mut net = GraphNet::new(&self.architecture, self.params.seed)?;
    let mut generator = ExprGenerator::new(self.generator, data_seed(self.params.seed))?;
    info!("[[ Network Architecture ]]\n{}", net);

    let report = train_model(&mut net, &self.params, &mut generator)?;

    if let Some(path) = self.weights_output_path {
      serialize_to_file(&path, &net.weight_embedding())?;
      info!("weights written to {}", path.display());
    }
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{model::WeightEmbedding, utils::deserialize_from_file};

  #[test]
  fn writes_weights_when_asked() {
    let _scope = crate::utils::init_logging_tests();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.json");
    let architecture: Architecture = "conv:8:2,relu,conv:2:5".parse().unwrap();
    let params = TrainParams {
      epochs: 2,
      batch_size: 2,
      ..TrainParams::default()
    };
    let report = Train::new(
      architecture.clone(),
      params,
      GeneratorConfig::default(),
      Some(path.clone()),
    )
    .run()
    .unwrap();
    assert_eq!(report.total(), crate::model::EVAL_TRIALS);

    let weights: WeightEmbedding = deserialize_from_file(&path).unwrap();
    assert_eq!(weights.len(), architecture.embedding_len());
  }
}
