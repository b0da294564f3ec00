//! Offline metrics over a parsed run file.

use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{ParsedRun, RunRecord, ScoreEntry, ScoredRun};

mod average_err;
mod recall;
mod subtopics;
mod u_err;

pub use cube_test::CubeTestParams;
pub use subtopics::SubtopicIndex;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, ValueEnum)]
pub enum Metric {
    #[value(name = "reciprocal_rank_at_recall")]
    ReciprocalRankAtRecall,
    #[value(name = "precision_at_recall")]
    PrecisionAtRecall,
    #[value(name = "modified_precision_at_recall")]
    ModifiedPrecisionAtRecall,
    #[value(name = "cube_test")]
    CubeTest,
    #[value(name = "average_err_arithmetic")]
    AverageErrArithmetic,
    #[value(name = "average_err_harmonic")]
    AverageErrHarmonic,
    #[value(name = "u_err")]
    UErr,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::ReciprocalRankAtRecall,
        Metric::PrecisionAtRecall,
        Metric::ModifiedPrecisionAtRecall,
        Metric::CubeTest,
        Metric::AverageErrArithmetic,
        Metric::AverageErrHarmonic,
        Metric::UErr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReciprocalRankAtRecall => "reciprocal_rank_at_recall",
            Self::PrecisionAtRecall => "precision_at_recall",
            Self::ModifiedPrecisionAtRecall => "modified_precision_at_recall",
            Self::CubeTest => "cube_test",
            Self::AverageErrArithmetic => "average_err_arithmetic",
            Self::AverageErrHarmonic => "average_err_harmonic",
            Self::UErr => "u_err",
        }
    }

    pub fn score(self, run: &ParsedRun, index: &SubtopicIndex, params: &ScoringParams) -> ScoreEntry {
        match self {
            Self::ReciprocalRankAtRecall => score_topics(run, index, recall::reciprocal_rank_at_recall),
            Self::PrecisionAtRecall => score_topics(run, index, recall::precision_at_recall),
            Self::ModifiedPrecisionAtRecall => {
                score_topics(run, index, recall::modified_precision_at_recall)
            }
            Self::CubeTest => score_topics(run, index, |records, roster| {
                cube_test::cube_test(records, roster, &params.cube_test)
            }),
            Self::AverageErrArithmetic => score_topics(run, index, |records, _| {
                average_err::average_err(records, average_err::MeanKind::Arithmetic)
            }),
            Self::AverageErrHarmonic => score_topics(run, index, |records, _| {
                average_err::average_err(records, average_err::MeanKind::Harmonic)
            }),
            Self::UErr => score_topics(run, index, u_err::u_err),
        }
    }
}

/// Tunable constants of the scoring functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    #[serde(default)]
    pub cube_test: CubeTestParams,
}

/// Graded relevance of a judgment rating, `(2^r - 1) / 16`.
pub fn relevance(rating: u32) -> f64 {
    let rating = i32::try_from(rating).unwrap_or(i32::MAX);
    (2f64.powi(rating) - 1.0) / 16.0
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Applies a per-topic scoring function to every topic and macro-averages.
fn score_topics(
    run: &ParsedRun,
    index: &SubtopicIndex,
    per_topic: impl Fn(&[RunRecord], &BTreeSet<String>) -> f64,
) -> ScoreEntry {
    let scores_by_topic: BTreeMap<String, f64> = run
        .topics()
        .map(|(topic_id, records)| {
            (
                topic_id.to_string(),
                per_topic(records, index.roster(topic_id)),
            )
        })
        .collect();
    let macro_average = mean(scores_by_topic.values().copied());

    ScoreEntry {
        scores_by_topic,
        macro_average,
    }
}

/// Runs the requested metrics in parallel and attaches each result under its
/// own name.
pub fn score_run(
    run: ParsedRun,
    index: &SubtopicIndex,
    metrics: &[Metric],
    params: &ScoringParams,
) -> ScoredRun {
    let selected: BTreeSet<Metric> = if metrics.is_empty() {
        Metric::ALL.into_iter().collect()
    } else {
        metrics.iter().copied().collect()
    };
    let selected: Vec<Metric> = selected.into_iter().collect();

    let scores: BTreeMap<String, ScoreEntry> = selected
        .par_iter()
        .map(|metric| {
            info!(metric = metric.as_str(), "running scorer");
            (metric.as_str().to_string(), metric.score(&run, index, params))
        })
        .collect();

    ScoredRun { run, scores }
}

/// One `<macro_average>\t<metric>` row per metric, sorted by metric name.
pub fn format_scores(scored: &ScoredRun) -> String {
    scored
        .scores
        .iter()
        .map(|(name, entry)| format!("{:.3}\t{name}", entry.macro_average))
        .collect::<Vec<_>>()
        .join("\n")
}
