use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::HarnessResult;
use crate::labels::LabelStore;
use crate::model::ParsedRun;

static EMPTY_ROSTER: BTreeSet<String> = BTreeSet::new();

/// Distinct judged subtopic ids per topic, the recall denominator of every
/// metric.
#[derive(Debug, Clone, Default)]
pub struct SubtopicIndex {
    by_topic: HashMap<String, BTreeSet<String>>,
}

impl SubtopicIndex {
    pub fn build<L: LabelStore + ?Sized>(labels: &L, run: &ParsedRun) -> HarnessResult<Self> {
        let mut index = Self::default();
        for topic_id in &run.topic_order {
            let roster = all_subtopics(labels, topic_id)?;
            if roster.is_empty() {
                warn!(topic_id = %topic_id, "topic has no judged subtopics; scores divide by zero");
            }
            debug!(topic_id = %topic_id, subtopics = roster.len(), "indexed subtopics");
            index.insert(topic_id.clone(), roster);
        }
        Ok(index)
    }

    pub fn insert(&mut self, topic_id: String, roster: BTreeSet<String>) {
        self.by_topic.insert(topic_id, roster);
    }

    pub fn roster(&self, topic_id: &str) -> &BTreeSet<String> {
        self.by_topic.get(topic_id).unwrap_or(&EMPTY_ROSTER)
    }
}

pub fn all_subtopics<L: LabelStore + ?Sized>(
    labels: &L,
    topic_id: &str,
) -> HarnessResult<BTreeSet<String>> {
    Ok(labels
        .directly_connected(topic_id)?
        .iter()
        .filter(|judgment| judgment.topic_id == topic_id)
        .filter_map(|judgment| judgment.subtopic_for(topic_id))
        .map(str::to_string)
        .collect())
}
