use std::collections::HashMap;

use super::{mean, relevance};
use crate::model::RunRecord;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MeanKind {
    Arithmetic,
    Harmonic,
}

/// Expected reciprocal rank computed per subtopic, then averaged over the
/// subtopics the run hit. A topic with no hits scores 0.
pub fn average_err(records: &[RunRecord], kind: MeanKind) -> f64 {
    let mut p_continue = HashMap::<&str, f64>::new();
    let mut scores = HashMap::<&str, f64>::new();

    for record in records {
        for subtopic in &record.subtopics {
            let id = subtopic.subtopic_id.as_str();
            let rel = relevance(subtopic.rating);
            let p = p_continue.entry(id).or_insert(1.0);

            *scores.entry(id).or_insert(0.0) += *p * rel / record.rank as f64;
            *p *= 1.0 - rel;
        }
    }

    match kind {
        MeanKind::Arithmetic => mean(scores.into_values()),
        MeanKind::Harmonic => harmonic_mean(scores.into_values()),
    }
}

fn harmonic_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut count = 0_usize;
    let mut reciprocal_sum = 0.0;
    for value in values {
        if value == 0.0 {
            return 0.0;
        }
        count += 1;
        reciprocal_sum += 1.0 / value;
    }
    if count == 0 {
        return 0.0;
    }
    count as f64 / reciprocal_sum
}
