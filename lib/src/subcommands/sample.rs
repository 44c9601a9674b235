use std::path::PathBuf;

use tracing::info;

use crate::{
  data::{ExprGenerator, GeneratorConfig},
  Result,
};

/// Draw one expression from the generator and export its graph as GraphML.
pub struct Sample {
  generator: GeneratorConfig,
  seed: u64,
  output_path: PathBuf,
}

impl Sample {
  pub fn new(generator: GeneratorConfig, seed: u64, output_path: PathBuf) -> Self {
    Self {
      generator,
      seed,
      output_path,
    }
  }

  pub fn run(self) -> Result<()> {
    let mut generator = ExprGenerator::new(self.generator, self.seed)?;
    let expr = generator.expression();
    let graph = crate::data::ExprGraph::from_expr(&expr)?;
    info!(
      "{} = {} (root: {}, {} nodes)",
      expr,
      expr.eval(),
      graph.root_op(),
      graph.num_nodes()
    );
    std::fs::write(&self.output_path, graph.graphml())?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::Op;

  #[test]
  fn exports_graphml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expr.graphml");
    let config = GeneratorConfig::default().with_root(Op::And);
    Sample::new(config, 9, path.clone()).run().unwrap();
    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("<graphml"));
    assert!(xml.contains("&amp;&amp;"));
  }
}
