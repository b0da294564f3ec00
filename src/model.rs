use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// A ground-truth connection between a topic and a document for one subtopic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub topic_id: String,
    pub document_id: String,
    pub subtopic_id: String,
    /// Passage offset (`start,end`) or passage id on the document side.
    pub passage_offset: String,
    pub annotator: String,
    pub polarity: Polarity,
    pub rating: u32,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Judgment {
    /// Returns the identifier connected to `id`, if `id` is either side.
    pub fn other_side(&self, id: &str) -> Option<&str> {
        if self.topic_id == id {
            Some(self.document_id.as_str())
        } else if self.document_id == id {
            Some(self.topic_id.as_str())
        } else {
            None
        }
    }

    /// Returns the subtopic identifier for the `id` side of the connection.
    pub fn subtopic_for(&self, id: &str) -> Option<&str> {
        if self.topic_id == id {
            Some(self.subtopic_id.as_str())
        } else if self.document_id == id {
            Some(self.passage_offset.as_str())
        } else {
            None
        }
    }

    pub fn connects(&self, first: &str, second: &str) -> bool {
        self.other_side(first) == Some(second)
    }

    pub fn is_negative(&self) -> bool {
        self.polarity == Polarity::Negative
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub query: String,
}

/// One (document, confidence) pair submitted by an engine in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedResult {
    pub document_id: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtopicFeedback {
    pub subtopic_id: String,
    pub rating: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub topic_id: String,
    #[serde(rename = "stream_id")]
    pub document_id: String,
    pub confidence: f64,
    pub on_topic: bool,
    pub subtopics: Vec<SubtopicFeedback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub rank: usize,
    #[serde(rename = "stream_id")]
    pub document_id: String,
    pub confidence: f64,
    pub on_topic: bool,
    pub subtopics: Vec<SubtopicFeedback>,
}

/// Run file contents grouped by topic, in the order topics were visited.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedRun {
    pub topic_order: Vec<String>,
    pub results: BTreeMap<String, Vec<RunRecord>>,
}

impl ParsedRun {
    pub fn topics(&self) -> impl Iterator<Item = (&str, &[RunRecord])> {
        self.topic_order.iter().map(|topic_id| {
            let records = self
                .results
                .get(topic_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            (topic_id.as_str(), records)
        })
    }

    pub fn record_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub scores_by_topic: BTreeMap<String, f64>,
    pub macro_average: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredRun {
    #[serde(flatten)]
    pub run: ParsedRun,
    pub scores: BTreeMap<String, ScoreEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResponse {
    pub num_topics: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartResponse {
    pub topic_id: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopResponse {
    pub finished: String,
    pub num_remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadResponse {
    pub source: String,
    pub format: String,
    pub sha256: String,
    pub labels_loaded: usize,
    pub lines_skipped: usize,
    pub total_labels: i64,
    pub num_topics: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub db_path: String,
    pub db_schema_version: Option<String>,
    pub total_labels: i64,
    pub num_topics: i64,
    pub roster_remaining: usize,
    pub current_topic: Option<Topic>,
    pub awaiting_stop: bool,
    pub last_load: Option<LabelSourceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelSourceEntry {
    pub source_path: String,
    pub sha256: String,
    pub format: String,
    pub loaded_at: String,
    pub labels_loaded: i64,
    pub lines_skipped: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoResponse {
    pub topics_evaluated: usize,
    pub steps: usize,
    pub results_submitted: usize,
    pub run_file_path: Option<String>,
}
