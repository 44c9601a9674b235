mod app_config;

use app_config::AppConfig;
use clap::{Parser, Subcommand};
use opweights::{
  archive::{ArchiveConfig, DEFAULT_DATA_DIR},
  model::{Architecture, Device},
  subcommands, utils,
};
use std::{error::Error, path::PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
  /// YAML config file; flags override its values
  #[arg(short, long, value_name = "PATH", global = true)]
  config: Option<PathBuf>,
  #[command(subcommand)]
  command: Command,
}

#[derive(clap::Args)]
struct TrainingArgs {
  #[arg(short, long, value_name = "INT")]
  epochs: Option<usize>,
  #[arg(short, long, value_name = "INT")]
  batch_size: Option<usize>,
  #[arg(long, value_name = "FLOAT")]
  learning_rate: Option<f32>,
  /// cpu or cuda
  #[arg(long)]
  device: Option<Device>,
  #[arg(short, long)]
  seed: Option<u64>,
  /// Layer stack, e.g. conv:8:16,relu,conv:16:5
  #[arg(short, long)]
  architecture: Option<Architecture>,
}

impl TrainingArgs {
  fn into_config(self) -> AppConfig {
    AppConfig {
      architecture: self.architecture,
      epochs: self.epochs,
      batch_size: self.batch_size,
      learning_rate: self.learning_rate,
      device: self.device,
      seed: self.seed,
      ..AppConfig::default()
    }
  }
}

#[derive(Subcommand)]
enum Command {
  /// Train one model on random expressions and report its root accuracy
  Train {
    #[command(flatten)]
    training: TrainingArgs,
    /// Write the trained weight embedding as JSON
    #[arg(long, value_name = "PATH")]
    weights: Option<PathBuf>,
  },
  /// Train one model per sample and archive the weight embeddings as train/test tar shards
  Archive {
    #[arg(long, value_name = "INT")]
    train_size: usize,
    #[arg(long, value_name = "INT")]
    test_size: usize,
    #[arg(short, long, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[command(flatten)]
    training: TrainingArgs,
  },
  /// Export one generated expression graph as GraphML
  Sample {
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,
    #[arg(long, value_name = "INT")]
    depth: Option<usize>,
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
  },
}

fn main() -> Result<(), Box<dyn Error>> {
  utils::init_logging()?;
  let args = Cli::parse();
  let file_config = match &args.config {
    Some(path) => AppConfig::load(path)?,
    None => AppConfig::default(),
  };

  match args.command {
    Command::Train { training, weights } => {
      let config = file_config.merge(training.into_config());
      let app = subcommands::Train::new(
        config.architecture(),
        config.train_params(),
        config.generator(),
        weights,
      );
      let report = app.run()?;
      println!("{report}");
    }
    Command::Archive {
      train_size,
      test_size,
      data_dir,
      training,
    } => {
      let config = file_config.merge(AppConfig {
        data_dir,
        ..training.into_config()
      });
      let app = subcommands::Archive::new(ArchiveConfig {
        train_size,
        test_size,
        data_dir: config
          .data_dir
          .clone()
          .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        architecture: config.architecture(),
        params: config.train_params(),
        generator: config.generator(),
      });
      let summary = app.run()?;
      info!(
        "datasets at {} and {}",
        summary.train_path.display(),
        summary.test_path.display()
      );
    }
    Command::Sample {
      output,
      depth,
      seed,
    } => {
      let config = file_config.merge(AppConfig {
        max_depth: depth,
        ..AppConfig::default()
      });
      subcommands::Sample::new(config.generator(), seed, output).run()?;
    }
  }
  Ok(())
}
