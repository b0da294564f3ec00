use std::collections::{BTreeSet, HashSet};

use crate::model::RunRecord;

/// 1-based rank at which the union of seen subtopics first covers the
/// roster, or the list length when it never does. The fallback understates
/// the real cost of never reaching full recall.
fn stopping_rank(records: &[RunRecord], roster: &BTreeSet<String>) -> usize {
    let mut seen = HashSet::<&str>::new();
    for (idx, record) in records.iter().enumerate() {
        seen.extend(record.subtopics.iter().map(|s| s.subtopic_id.as_str()));
        if roster.iter().all(|subtopic| seen.contains(subtopic.as_str())) {
            return idx + 1;
        }
    }
    records.len()
}

pub fn reciprocal_rank_at_recall(records: &[RunRecord], roster: &BTreeSet<String>) -> f64 {
    1.0 / stopping_rank(records, roster) as f64
}

/// Documents carrying any subtopic feedback, over the stopping rank.
pub fn precision_at_recall(records: &[RunRecord], roster: &BTreeSet<String>) -> f64 {
    let stop = stopping_rank(records, roster);
    let relevant = records[..stop]
        .iter()
        .filter(|record| !record.subtopics.is_empty())
        .count();
    relevant as f64 / stop as f64
}

/// Each document earns the fraction of its distinct subtopics that are new.
pub fn modified_precision_at_recall(records: &[RunRecord], roster: &BTreeSet<String>) -> f64 {
    let stop = stopping_rank(records, roster);
    let mut seen = HashSet::<&str>::new();
    let mut relevant = 0.0;

    for record in &records[..stop] {
        let subtopics: HashSet<&str> = record
            .subtopics
            .iter()
            .map(|s| s.subtopic_id.as_str())
            .collect();
        if !subtopics.is_empty() {
            let new = subtopics.difference(&seen).count();
            relevant += new as f64 / subtopics.len() as f64;
        }
        seen.extend(subtopics);
    }

    relevant / stop as f64
}
