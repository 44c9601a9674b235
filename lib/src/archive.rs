//! Dataset archiver: trains one model per sample and stores `(weight embedding, label)` pairs
//! in tar shards, two entries per sample:
//!
//! - `sampleNNNNNN.input.json`: the embedding as a JSON array of floats
//! - `sampleNNNNNN.output.json`: the label index as a one-element JSON array
use std::{
  fs::{self, File},
  io::{Read, Write},
  ops::Range,
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use crate::{
  data::{GeneratorConfig, Op},
  model::{train_expression, Architecture, TrainParams, WeightEmbedding},
  Error, Result,
};

pub const TRAIN_ARCHIVE: &str = "train_data.tar";
pub const TEST_ARCHIVE: &str = "test_data.tar";
pub const DEFAULT_DATA_DIR: &str = "./data/";

const INPUT_SUFFIX: &str = "input.json";
const OUTPUT_SUFFIX: &str = "output.json";

/// Contiguous index range per label: boundaries at `floor(size * k / 5)`.
pub fn label_buckets(size: usize) -> Vec<(Op, Range<usize>)> {
  let bound = |k: usize| size * k / Op::COUNT;
  Op::ALL
    .iter()
    .enumerate()
    .map(|(k, op)| (*op, bound(k)..bound(k + 1)))
    .collect()
}

pub fn label_for_index(index: usize, size: usize) -> Option<Op> {
  label_buckets(size)
    .into_iter()
    .find(|(_, range)| range.contains(&index))
    .map(|(op, _)| op)
}

pub fn sample_key(index: usize) -> String {
  format!("sample{index:06}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardRecord {
  pub key: String,
  pub embedding: WeightEmbedding,
  pub label: Op,
}

/// Append-only tar sink of [`ShardRecord`]s.
pub struct ShardWriter<W: Write> {
  builder: tar::Builder<W>,
  written: usize,
}

impl ShardWriter<File> {
  pub fn create(path: &Path) -> Result<Self> {
    Ok(Self::new(File::create(path)?))
  }
}

impl<W: Write> ShardWriter<W> {
  pub fn new(inner: W) -> Self {
    Self {
      builder: tar::Builder::new(inner),
      written: 0,
    }
  }

  pub fn written(&self) -> usize {
    self.written
  }

  pub fn write(&mut self, record: &ShardRecord) -> Result<()> {
    let input = serde_json::to_vec(&record.embedding)?;
    let output = serde_json::to_vec(&[record.label.index()])?;
    self.append(&format!("{}.{INPUT_SUFFIX}", record.key), &input)?;
    self.append(&format!("{}.{OUTPUT_SUFFIX}", record.key), &output)?;
    self.written += 1;
    Ok(())
  }

  fn append(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
    let mtime = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or_default();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o444);
    header.set_mtime(mtime);
    self.builder.append_data(&mut header, name, bytes)?;
    Ok(())
  }

  /// Write the archive trailer and hand back the underlying writer.
  pub fn finish(self) -> Result<W> {
    Ok(self.builder.into_inner()?)
  }
}

#[derive(Default)]
struct PartialRecord {
  key: String,
  embedding: Option<WeightEmbedding>,
  label: Option<Op>,
}

/// Read every record of a shard back, in archive order.
pub fn read_shard(path: &Path) -> Result<Vec<ShardRecord>> {
  let mut archive = tar::Archive::new(File::open(path)?);
  let mut partials: Vec<PartialRecord> = Vec::new();
  for entry in archive.entries()? {
    let mut entry = entry?;
    let name = entry.path()?.to_string_lossy().into_owned();
    let (key, suffix) = name
      .split_once('.')
      .ok_or_else(|| Error::Shard(format!("entry {name:?} has no extension")))?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;

    if partials.last().map(|p| p.key != key).unwrap_or(true) {
      partials.push(PartialRecord {
        key: key.to_string(),
        ..PartialRecord::default()
      });
    }
    let Some(partial) = partials.last_mut() else {
      continue;
    };
    match suffix {
      INPUT_SUFFIX => partial.embedding = Some(serde_json::from_str(&content)?),
      OUTPUT_SUFFIX => {
        let label: Vec<usize> = serde_json::from_str(&content)?;
        let [index] = label.as_slice() else {
          return Err(Error::Shard(format!("{key}: expected one label, found {}", label.len())));
        };
        partial.label = Some(Op::from_index(*index)?);
      }
      other => return Err(Error::Shard(format!("{key}: unexpected entry {other:?}"))),
    }
  }

  partials
    .into_iter()
    .map(|partial| match (partial.embedding, partial.label) {
      (Some(embedding), Some(label)) => Ok(ShardRecord {
        key: partial.key,
        embedding,
        label,
      }),
      _ => Err(Error::Shard(format!("{}: incomplete sample", partial.key))),
    })
    .collect()
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
  pub train_size: usize,
  pub test_size: usize,
  pub data_dir: PathBuf,
  pub architecture: Architecture,
  pub params: TrainParams,
  pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
  pub train_path: PathBuf,
  pub test_path: PathBuf,
  pub train_records: usize,
  pub test_records: usize,
  pub embedding_len: usize,
}

/// Train `train_size + test_size` models and write their embeddings to
/// `train_data.tar` / `test_data.tar` under the data directory.
#[tracing::instrument(skip_all, fields(train = config.train_size, test = config.test_size))]
pub fn create_datasets(config: &ArchiveConfig) -> Result<ArchiveSummary> {
  config.architecture.validate()?;
  info!("[ saving train/test data and labels ]");
  fs::create_dir_all(&config.data_dir)?;

  let train_path = config.data_dir.join(TRAIN_ARCHIVE);
  let test_path = config.data_dir.join(TEST_ARCHIVE);
  let mut train_sink = ShardWriter::create(&train_path)?;
  let mut test_sink = ShardWriter::create(&test_path)?;

  write_split(&mut train_sink, config, config.train_size, 0, "train")?;
  write_split(
    &mut test_sink,
    config,
    config.test_size,
    config.train_size as u64,
    "test",
  )?;

  let summary = ArchiveSummary {
    train_records: train_sink.written(),
    test_records: test_sink.written(),
    embedding_len: config.architecture.embedding_len(),
    train_path,
    test_path,
  };
  train_sink.finish()?;
  test_sink.finish()?;
  info!(
    "wrote {} train and {} test samples ({} weights each)",
    summary.train_records, summary.test_records, summary.embedding_len
  );
  Ok(summary)
}

fn write_split<W: Write>(
  sink: &mut ShardWriter<W>,
  config: &ArchiveConfig,
  size: usize,
  seed_offset: u64,
  name: &'static str,
) -> Result<()> {
  let style = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})")
    .unwrap_or_else(|_| ProgressStyle::default_bar());
  let progress = ProgressBar::new(size as u64)
    .with_style(style)
    .with_message(name);

  for (label, range) in label_buckets(size) {
    for index in range {
      let params = TrainParams {
        seed: config.params.seed.wrapping_add(seed_offset + index as u64),
        ..config.params.clone()
      };
      let trained = train_expression(&config.architecture, &params, &config.generator, label)?;
      sink.write(&ShardRecord {
        key: sample_key(index),
        embedding: trained.embedding,
        label,
      })?;
      progress.inc(1);
    }
  }
  progress.finish_and_clear();
  Ok(())
}
