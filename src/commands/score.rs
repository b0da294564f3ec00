use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ScoreArgs;
use crate::config::HarnessConfig;
use crate::harness::load_run;
use crate::labels::SqliteLabelStore;
use crate::scorer::{SubtopicIndex, format_scores, score_run};
use crate::store::open_database_read_only;
use crate::util::write_json_pretty;

pub fn run(config: &HarnessConfig, args: ScoreArgs) -> Result<()> {
    let output = &args.scored_run_output_path;
    if output.exists() && !args.overwrite {
        bail!(
            "{} already exists; pass --overwrite to replace it",
            output.display()
        );
    }
    if !config.db_path.exists() {
        bail!(
            "label database missing at {}; run load first",
            config.db_path.display()
        );
    }

    let labels = SqliteLabelStore::new(open_database_read_only(&config.db_path)?);
    let run = load_run(&args.run_file_path)
        .with_context(|| format!("failed to read run file {}", args.run_file_path.display()))?;
    info!(
        path = %args.run_file_path.display(),
        topics = run.topic_order.len(),
        records = run.record_count(),
        "loaded run file"
    );

    let index = SubtopicIndex::build(&labels, &run)?;
    let scored = score_run(run, &index, &args.scorers, &config.scoring);

    println!("{}", format_scores(&scored));
    write_json_pretty(output, &scored)?;

    info!(
        output = %output.display(),
        metrics = scored.scores.len(),
        "wrote scored run"
    );
    Ok(())
}
