use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::scorer::Metric;
use crate::truth_data::TruthDataFormat;

#[derive(Parser, Debug)]
#[command(
    name = "trec-dd",
    version,
    about = "Evaluation jig for TREC Dynamic Domain systems"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// TOML config file.
    #[arg(long, short = 'c', global = true, env = "TREC_DD_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub cache_root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Append feedback to this run file.
    #[arg(long, global = true)]
    pub run_file_path: Option<PathBuf>,

    /// Number of results per step.
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Print JSON on a single line instead of pretty-printed.
    #[arg(long, global = true, default_value_t = false)]
    pub one_line: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load truth data into the label store.
    Load(LoadArgs),
    /// Build the topic roster and reset the session.
    Init(InitArgs),
    /// Report the current topic.
    Start,
    /// Submit one batch of results for the current topic.
    Step(StepArgs),
    /// Close the current topic.
    Stop(StopArgs),
    /// Score a run file.
    Score(ScoreArgs),
    /// Show label store and session state.
    Status,
    /// Run the random baseline system through the roster.
    Demo(DemoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    pub truth_data_path: PathBuf,

    #[arg(long, value_enum, default_value_t = TruthDataFormat::Csv)]
    pub format: TruthDataFormat,

    /// Treat negative grades as positive judgments with rating 0.
    #[arg(long, default_value_t = false)]
    pub assume_positive: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Restrict the roster to these topics.
    pub topic_ids: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StepArgs {
    pub topic_id: String,

    /// Alternating document ids and confidences.
    #[arg(allow_hyphen_values = true)]
    pub results: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StopArgs {
    pub topic_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    pub run_file_path: PathBuf,

    /// Where to write the run with scores attached.
    pub scored_run_output_path: PathBuf,

    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Metrics to run; all of them when omitted.
    #[arg(long = "scorer", value_enum)]
    pub scorers: Vec<Metric>,
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    #[arg(long, default_value_t = 5)]
    pub steps_per_topic: usize,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep the existing roster instead of running init first.
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}
