use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::LoadArgs;
use crate::config::HarnessConfig;
use crate::labels::SqliteLabelStore;
use crate::model::{LabelSourceEntry, LoadResponse};
use crate::store::open_database;
use crate::truth_data::parse_truth_data;
use crate::util::{now_utc_string, sha256_file, write_json_stdout};

pub fn run(config: &HarnessConfig, args: LoadArgs, one_line: bool) -> Result<()> {
    let path = &args.truth_data_path;
    if !path.is_file() {
        bail!("truth data file not found: {}", path.display());
    }

    let sha256 = sha256_file(path)?;
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let parsed = parse_truth_data(BufReader::new(file), args.format, args.assume_positive)
        .with_context(|| format!("failed to parse truth data {}", path.display()))?;

    if !parsed.skipped.is_empty() {
        warn!(
            path = %path.display(),
            skipped = parsed.skipped.len(),
            "dropped invalid truth data lines"
        );
    }

    let mut labels = SqliteLabelStore::new(open_database(&config.db_path)?);
    let labels_loaded = labels.put_all(&parsed.judgments)?;
    labels.record_source(&LabelSourceEntry {
        source_path: path.display().to_string(),
        sha256: sha256.clone(),
        format: args.format.as_str().to_string(),
        loaded_at: now_utc_string(),
        labels_loaded: labels_loaded as i64,
        lines_skipped: parsed.skipped.len() as i64,
    })?;

    let response = LoadResponse {
        source: path.display().to_string(),
        format: args.format.as_str().to_string(),
        sha256,
        labels_loaded,
        lines_skipped: parsed.skipped.len(),
        total_labels: labels.count()?,
        num_topics: labels.topic_count()?,
    };

    info!(
        path = %path.display(),
        db = %config.db_path.display(),
        labels_loaded = response.labels_loaded,
        total_labels = response.total_labels,
        num_topics = response.num_topics,
        "loaded truth data"
    );

    write_json_stdout(&response, one_line)
}
