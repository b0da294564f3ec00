//! Turn-based evaluation session: topic roster, batch contract, feedback.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::labels::LabelStore;
use crate::model::{
    FeedbackRecord, InitResponse, StartResponse, StopResponse, SubmittedResult, SubtopicFeedback,
    Topic,
};

mod run_log;
mod session_store;
#[cfg(test)]
mod tests;

pub use run_log::{RunLogWriter, load_run};
#[cfg(test)]
pub use run_log::{format_record, parse_run};
pub use session_store::{SessionState, SessionStore};

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const MAX_CONFIDENCE: f64 = 1000.0;

/// Drives the init/start/step/stop protocol against a label store, a durable
/// session store, and an optional run file.
pub struct SessionController<'a, L: LabelStore + ?Sized> {
    labels: &'a L,
    batch_size: usize,
    run_log: Option<RunLogWriter>,
}

impl<'a, L: LabelStore + ?Sized> SessionController<'a, L> {
    pub fn new(labels: &'a L, batch_size: usize, run_log: Option<RunLogWriter>) -> Self {
        Self {
            labels,
            batch_size,
            run_log,
        }
    }

    /// Rebuilds the roster from the label store, discarding any prior session.
    pub fn init(
        &self,
        session: &mut SessionStore,
        topic_filter: Option<&[String]>,
    ) -> HarnessResult<InitResponse> {
        let roster = self.build_roster(topic_filter)?;
        let num_topics = roster.len();

        session.update(|state| {
            state.roster = roster.into();
            state.awaiting_stop = false;
        })?;

        info!(num_topics, "initialized topic roster");
        Ok(InitResponse { num_topics })
    }

    pub fn start(&self, session: &SessionStore) -> HarnessResult<StartResponse> {
        let state = session.state();
        if state.awaiting_stop {
            return Err(HarnessError::protocol(
                "must call stop on the current topic before start; a short batch was submitted",
            ));
        }
        self.ensure_labels()?;

        let response = match state.current_topic() {
            Some(topic) => {
                info!(topic_id = %topic.topic_id, "starting topic");
                StartResponse {
                    topic_id: Some(topic.topic_id.clone()),
                    query: Some(topic.query.clone()),
                }
            }
            None => {
                info!("topic roster exhausted");
                StartResponse {
                    topic_id: None,
                    query: None,
                }
            }
        };
        Ok(response)
    }

    pub fn step(
        &mut self,
        session: &mut SessionStore,
        topic_id: &str,
        results: &[SubmittedResult],
    ) -> HarnessResult<Vec<FeedbackRecord>> {
        if session.state().awaiting_stop {
            return Err(HarnessError::protocol(format!(
                "must call stop on topic {topic_id} before submitting another batch"
            )));
        }
        self.ensure_labels()?;
        ensure_current_topic(session.state(), topic_id)?;

        if results.len() > self.batch_size {
            return Err(HarnessError::protocol(format!(
                "too many submissions: {} results exceeds batch size {}",
                results.len(),
                self.batch_size
            )));
        }
        for result in results {
            validate_result(result)?;
        }

        let mut feedback = Vec::with_capacity(results.len());
        for result in results {
            feedback.push(self.feedback_for(topic_id, result)?);
        }

        if let Some(run_log) = self.run_log.as_mut() {
            run_log.append(&feedback)?;
        }

        if results.len() < self.batch_size {
            debug!(
                topic_id,
                submitted = results.len(),
                batch_size = self.batch_size,
                "short batch, topic must be stopped next"
            );
            session.update(|state| state.awaiting_stop = true)?;
        }

        info!(
            topic_id,
            submitted = results.len(),
            on_topic = feedback.iter().filter(|record| record.on_topic).count(),
            "processed batch"
        );
        Ok(feedback)
    }

    pub fn stop(&self, session: &mut SessionStore, topic_id: &str) -> HarnessResult<StopResponse> {
        ensure_current_topic(session.state(), topic_id)?;

        let num_remaining = session.update(|state| {
            state.roster.pop_front();
            state.awaiting_stop = false;
            state.roster.len()
        })?;

        info!(topic_id, num_remaining, "finished topic");
        Ok(StopResponse {
            finished: topic_id.to_string(),
            num_remaining,
        })
    }

    fn ensure_labels(&self) -> HarnessResult<()> {
        if self.labels.is_empty()? {
            return Err(HarnessError::protocol(
                "label store is empty; load truth data before running a session",
            ));
        }
        Ok(())
    }

    fn build_roster(&self, topic_filter: Option<&[String]>) -> HarnessResult<Vec<Topic>> {
        let mut order = Vec::<String>::new();
        let mut queries = HashMap::<String, String>::new();

        for judgment in self.labels.everything()? {
            let topic_name = judgment
                .meta
                .get("topic_name")
                .filter(|name| !name.trim().is_empty())
                .cloned();
            match queries.get_mut(&judgment.topic_id) {
                Some(query) => {
                    if query == &judgment.topic_id {
                        if let Some(name) = topic_name {
                            *query = name;
                        }
                    }
                }
                None => {
                    let query = topic_name.unwrap_or_else(|| judgment.topic_id.clone());
                    queries.insert(judgment.topic_id.clone(), query);
                    order.push(judgment.topic_id);
                }
            }
        }

        let selected: Vec<String> = match topic_filter {
            Some(filter) => {
                let mut seen = HashSet::new();
                filter
                    .iter()
                    .filter(|topic_id| seen.insert(topic_id.as_str()))
                    .filter(|topic_id| {
                        let known = queries.contains_key(topic_id.as_str());
                        if !known {
                            warn!(topic_id = %topic_id, "topic filter names a topic with no judgments");
                        }
                        known
                    })
                    .cloned()
                    .collect()
            }
            None => order,
        };

        Ok(selected
            .into_iter()
            .map(|topic_id| {
                let query = queries.get(&topic_id).cloned().unwrap_or_default();
                Topic { topic_id, query }
            })
            .collect())
    }

    /// A document is on topic when it has judgments for the topic and none of
    /// them is negative; every judgment then yields one subtopic entry.
    fn feedback_for(&self, topic_id: &str, result: &SubmittedResult) -> HarnessResult<FeedbackRecord> {
        let judgments = self.labels.connecting(&result.document_id, topic_id)?;
        let on_topic = !judgments.is_empty() && judgments.iter().all(|j| !j.is_negative());

        let subtopics = if on_topic {
            judgments
                .iter()
                .filter_map(|judgment| {
                    judgment.subtopic_for(topic_id).map(|subtopic_id| SubtopicFeedback {
                        subtopic_id: subtopic_id.to_string(),
                        rating: judgment.rating,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(FeedbackRecord {
            topic_id: topic_id.to_string(),
            document_id: result.document_id.clone(),
            confidence: result.confidence,
            on_topic,
            subtopics,
        })
    }
}

fn ensure_current_topic(state: &SessionState, topic_id: &str) -> HarnessResult<()> {
    match state.current_topic() {
        Some(current) if current.topic_id == topic_id => Ok(()),
        Some(current) => Err(HarnessError::protocol(format!(
            "out of sync: topic {topic_id} is not the current topic {}",
            current.topic_id
        ))),
        None => Err(HarnessError::protocol(format!(
            "out of sync: topic {topic_id} requested but the roster is empty"
        ))),
    }
}

fn validate_result(result: &SubmittedResult) -> HarnessResult<()> {
    if result.document_id.trim().is_empty() {
        return Err(HarnessError::validation("document id must not be empty"));
    }
    if result.document_id.contains(['\t', '\n', '\r']) {
        return Err(HarnessError::validation(format!(
            "document id {:?} must not contain tabs or line breaks",
            result.document_id
        )));
    }
    if !(0.0..=MAX_CONFIDENCE).contains(&result.confidence) {
        return Err(HarnessError::validation(format!(
            "confidence {} for document {} is outside [0, {MAX_CONFIDENCE}]",
            result.confidence, result.document_id
        )));
    }
    Ok(())
}

/// Turns the flat `doc conf doc conf ...` token list of the CLI into results.
pub fn parse_result_tokens(tokens: &[String], batch_size: usize) -> HarnessResult<Vec<SubmittedResult>> {
    if tokens.len() > 2 * batch_size {
        return Err(HarnessError::protocol(format!(
            "too many submissions: {} arguments exceeds twice the batch size (2 x {batch_size} = {})",
            tokens.len(),
            2 * batch_size
        )));
    }
    if tokens.len() % 2 != 0 {
        return Err(HarnessError::validation(format!(
            "results must be document/confidence pairs, found {} arguments",
            tokens.len()
        )));
    }

    tokens
        .chunks(2)
        .map(|pair| {
            let confidence = pair[1].parse::<f64>().map_err(|_| {
                HarnessError::validation(format!(
                    "confidence {:?} for document {} is not a number",
                    pair[1], pair[0]
                ))
            })?;
            Ok(SubmittedResult {
                document_id: pair[0].clone(),
                confidence,
            })
        })
        .collect()
}
