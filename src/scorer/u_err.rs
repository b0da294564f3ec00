use std::collections::BTreeSet;

use crate::model::RunRecord;

/// Results returned per judged subtopic; a normalization figure rather than
/// a relevance measure.
pub fn u_err(records: &[RunRecord], roster: &BTreeSet<String>) -> f64 {
    records.len() as f64 / roster.len() as f64
}
