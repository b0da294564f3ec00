use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cli::GlobalArgs;
use crate::harness::DEFAULT_BATCH_SIZE;
use crate::scorer::{CubeTestParams, ScoringParams};

pub const DEFAULT_CACHE_ROOT: &str = ".cache/trec_dd";
pub const DB_FILENAME: &str = "trec_dd.sqlite";

/// Settings read from the optional TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub cache_root: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    /// Append target for feedback; logging is disabled when unset.
    pub run_file_path: Option<PathBuf>,
    /// Restricts the roster built by `init`.
    pub topic_ids: Vec<String>,
    pub batch_size: Option<usize>,
    pub cube_test: CubeTestParams,
}

/// Effective settings: command-line flags over the config file over defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub db_path: PathBuf,
    pub run_file_path: Option<PathBuf>,
    pub topic_ids: Vec<String>,
    pub batch_size: usize,
    pub scoring: ScoringParams,
}

impl HarnessConfig {
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => load_file_config(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: &GlobalArgs, file: FileConfig) -> Result<Self> {
        let cache_root = args
            .cache_root
            .clone()
            .or(file.cache_root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT));
        let db_path = args
            .db_path
            .clone()
            .or(file.db_path)
            .unwrap_or_else(|| cache_root.join(DB_FILENAME));

        let batch_size = args
            .batch_size
            .or(file.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("batch_size must be at least 1");
        }

        Ok(Self {
            db_path,
            run_file_path: args.run_file_path.clone().or(file.run_file_path),
            topic_ids: file.topic_ids,
            batch_size,
            scoring: ScoringParams {
                cube_test: file.cube_test,
            },
        })
    }
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: FileConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}
