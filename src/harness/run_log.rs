use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::model::{FeedbackRecord, ParsedRun, RunRecord, SubtopicFeedback};
use crate::util::now_utc_string;

pub const NULL_STANZA: &str = "NULL";
const FIELD_COUNT: usize = 5;

/// Append-only writer for the tab-separated run file. The file is created on
/// the first non-empty append.
pub struct RunLogWriter {
    path: PathBuf,
    file: Option<File>,
}

impl RunLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Appends the lines for a batch of feedback and flushes them. Nothing is
    /// written when any record cannot be represented in the run file.
    pub fn append(&mut self, records: &[FeedbackRecord]) -> HarnessResult<()> {
        let mut buffer = String::new();
        for record in records {
            for line in format_record(record)? {
                buffer.push_str(&line);
                buffer.push('\n');
            }
        }
        if buffer.is_empty() {
            return Ok(());
        }

        let file = match self.file.take() {
            Some(file) => file,
            None => open_for_append(&self.path)?,
        };
        let file = self.file.insert(file);
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        debug!(path = %self.path.display(), records = records.len(), "appended feedback to run file");
        Ok(())
    }
}

fn open_for_append(path: &Path) -> HarnessResult<File> {
    let existed = path.exists();
    if existed {
        warn!(path = %path.display(), "appending to existing run file");
    } else {
        warn!(path = %path.display(), "starting new run file");
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if !existed {
        writeln!(file, "# trec-dd run file created {}", now_utc_string())?;
    }
    Ok(file)
}

/// One line per subtopic, or a single `NULL` line when the record carries no
/// subtopic feedback. Identifiers that would collide with the line syntax
/// are rejected.
pub fn format_record(record: &FeedbackRecord) -> HarnessResult<Vec<String>> {
    if record.topic_id.starts_with('#') {
        return Err(HarnessError::integrity(format!(
            "topic id {:?} would be read back as a comment",
            record.topic_id
        )));
    }
    check_field("topic id", &record.topic_id, FIELD_SEPARATORS)?;
    check_field("document id", &record.document_id, FIELD_SEPARATORS)?;

    let on_topic = u8::from(record.on_topic);
    let prefix = format!(
        "{}\t{}\t{:.6}\t{}",
        record.topic_id, record.document_id, record.confidence, on_topic
    );

    if record.subtopics.is_empty() {
        return Ok(vec![format!("{prefix}\t{NULL_STANZA}")]);
    }

    record
        .subtopics
        .iter()
        .map(|subtopic| {
            check_field("subtopic id", &subtopic.subtopic_id, STANZA_SEPARATORS)?;
            Ok(format!("{prefix}\t{}:{}", subtopic.subtopic_id, subtopic.rating))
        })
        .collect()
}

const FIELD_SEPARATORS: &[char] = &['\t', '\n', '\r'];
const STANZA_SEPARATORS: &[char] = &['\t', '\n', '\r', '|'];

fn check_field(name: &str, value: &str, separators: &[char]) -> HarnessResult<()> {
    if value.contains(separators) {
        return Err(HarnessError::integrity(format!(
            "{name} {value:?} contains a run file separator"
        )));
    }
    Ok(())
}

pub fn load_run(path: &Path) -> HarnessResult<ParsedRun> {
    let file = File::open(path)?;
    parse_run(BufReader::new(file), &path.display().to_string())
}

/// Groups run-file lines into per-topic ranked lists. A topic that stops
/// being current may never appear again.
pub fn parse_run<R: BufRead>(reader: R, source: &str) -> HarnessResult<ParsedRun> {
    let mut run = ParsedRun::default();
    let mut seen_topics = HashSet::<String>::new();
    let mut current_topic: Option<String> = None;
    let mut rank = 1;

    for (idx, line) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(HarnessError::integrity(format!(
                "{source}:{line_number}: expected {FIELD_COUNT} tab-separated fields, found {}",
                fields.len()
            )));
        }

        let topic_id = fields[0];
        if current_topic.as_deref() != Some(topic_id) {
            if !seen_topics.insert(topic_id.to_string()) {
                return Err(HarnessError::integrity(format!(
                    "{source}:{line_number}: run file returns to previously finished topic {topic_id}"
                )));
            }
            current_topic = Some(topic_id.to_string());
            run.topic_order.push(topic_id.to_string());
            rank = 1;
        }

        let confidence = fields[2].parse::<f64>().map_err(|_| {
            HarnessError::integrity(format!(
                "{source}:{line_number}: invalid confidence {:?}",
                fields[2]
            ))
        })?;
        let on_topic = match fields[3] {
            "0" => false,
            "1" => true,
            other => {
                return Err(HarnessError::integrity(format!(
                    "{source}:{line_number}: on_topic must be 0 or 1, found {other:?}"
                )));
            }
        };
        let subtopics = parse_stanza(fields[4], on_topic)
            .map_err(|reason| HarnessError::integrity(format!("{source}:{line_number}: {reason}")))?;

        run.results
            .entry(topic_id.to_string())
            .or_default()
            .push(RunRecord {
                rank,
                document_id: fields[1].to_string(),
                confidence,
                on_topic,
                subtopics,
            });
        rank += 1;
    }

    Ok(run)
}

fn parse_stanza(stanza: &str, on_topic: bool) -> Result<Vec<SubtopicFeedback>, String> {
    if stanza == NULL_STANZA {
        if on_topic {
            return Err("NULL subtopic stanza on an on-topic line".to_string());
        }
        return Ok(Vec::new());
    }

    stanza
        .split('|')
        .map(|entry| {
            let (subtopic_id, rating) = entry
                .rsplit_once(':')
                .ok_or_else(|| format!("subtopic entry {entry:?} is not subtopic:rating"))?;
            let rating = rating
                .parse::<u32>()
                .map_err(|_| format!("invalid rating in subtopic entry {entry:?}"))?;
            Ok(SubtopicFeedback {
                subtopic_id: subtopic_id.to_string(),
                rating,
            })
        })
        .collect()
}
