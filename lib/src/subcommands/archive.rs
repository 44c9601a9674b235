use crate::{
  archive::{create_datasets, ArchiveConfig, ArchiveSummary},
  Result,
};

/// Build the train/test weight datasets.
pub struct Archive {
  config: ArchiveConfig,
}

impl Archive {
  pub fn new(config: ArchiveConfig) -> Self {
    Self { config }
  }

  pub fn run(self) -> Result<ArchiveSummary> {
    create_datasets(&self.config)
  }
}
