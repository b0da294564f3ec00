use std::collections::BTreeMap;
use std::io::BufRead;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::{debug, warn};

use crate::model::{Judgment, Polarity};

const CSV_COLUMN_COUNT: usize = 15;
const QRELS_COLUMN_COUNT: usize = 5;
const QRELS_ANNOTATOR: &str = "qrels";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TruthDataFormat {
    /// NIST truth-data CSV with a header row.
    Csv,
    /// Tab-separated `topic subtopic docno passage_id rating` lines.
    Qrels,
}

impl TruthDataFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Qrels => "qrels",
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedTruthData {
    pub judgments: Vec<Judgment>,
    pub skipped: Vec<String>,
}

pub fn parse_truth_data<R: BufRead>(
    reader: R,
    format: TruthDataFormat,
    assume_positive: bool,
) -> Result<ParsedTruthData> {
    let mut parsed = ParsedTruthData::default();

    for (idx, line) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.with_context(|| format!("failed to read truth data line {line_number}"))?;
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            continue;
        }
        if format == TruthDataFormat::Csv && line_number == 1 {
            debug!(header = %line, "skipping truth data header");
            continue;
        }
        if format == TruthDataFormat::Qrels && line.starts_with('#') {
            continue;
        }

        let outcome = match format {
            TruthDataFormat::Csv => judgment_from_csv_line(line, assume_positive),
            TruthDataFormat::Qrels => judgment_from_qrels_line(line, assume_positive),
        };

        match outcome {
            Ok(judgment) => parsed.judgments.push(judgment),
            Err(reason) => {
                warn!(line = line_number, reason = %reason, "dropping truth data line");
                parsed.skipped.push(format!("line {line_number}: {reason}"));
            }
        }
    }

    Ok(parsed)
}

fn judgment_from_csv_line(line: &str, assume_positive: bool) -> Result<Judgment, String> {
    let fields = split_csv_record(line);
    if fields.len() != CSV_COLUMN_COUNT {
        return Err(format!(
            "expected {CSV_COLUMN_COUNT} columns, found {}",
            fields.len()
        ));
    }

    let field = |idx: usize| fields[idx].trim().to_string();

    let document_id = field(10);
    if document_id.is_empty() {
        return Err("empty document id".to_string());
    }

    let offset_start = field(11);
    let offset_end = field(12);
    if offset_start.parse::<u64>().is_err() || offset_end.parse::<u64>().is_err() {
        return Err(format!("invalid passage offsets {offset_start:?},{offset_end:?}"));
    }

    let passage_text = field(9);
    if passage_text.is_empty() {
        return Err("empty passage text".to_string());
    }

    let grade = field(13);
    let grade = grade
        .parse::<i64>()
        .map_err(|_| format!("non-numeric grade {grade:?}"))?;
    let (polarity, rating) = polarity_and_rating(grade, assume_positive);

    let mut meta = BTreeMap::new();
    meta.insert("domain_id".to_string(), field(0));
    meta.insert("domain_name".to_string(), field(1));
    meta.insert("username".to_string(), field(3));
    meta.insert("topic_id".to_string(), field(4));
    meta.insert("topic_name".to_string(), field(5));
    meta.insert("subtopic_name".to_string(), field(7));
    meta.insert("passage_text".to_string(), passage_text);

    Ok(Judgment {
        topic_id: field(4),
        document_id,
        subtopic_id: field(6),
        passage_offset: format!("{offset_start},{offset_end}"),
        annotator: field(2),
        polarity,
        rating,
        meta,
    })
}

fn judgment_from_qrels_line(line: &str, assume_positive: bool) -> Result<Judgment, String> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() != QRELS_COLUMN_COUNT {
        return Err(format!(
            "expected {QRELS_COLUMN_COUNT} columns, found {}",
            fields.len()
        ));
    }

    let document_id = fields[2];
    if document_id.is_empty() {
        return Err("empty document id".to_string());
    }
    if fields[3].is_empty() {
        return Err("empty passage id".to_string());
    }

    let grade = fields[4]
        .parse::<i64>()
        .map_err(|_| format!("non-numeric grade {:?}", fields[4]))?;
    let (polarity, rating) = polarity_and_rating(grade, assume_positive);

    Ok(Judgment {
        topic_id: fields[0].to_string(),
        document_id: document_id.to_string(),
        subtopic_id: fields[1].to_string(),
        passage_offset: fields[3].to_string(),
        annotator: QRELS_ANNOTATOR.to_string(),
        polarity,
        rating,
        meta: BTreeMap::new(),
    })
}

/// Negative grades mark a passage as off-topic; their rating is clamped to 0.
fn polarity_and_rating(grade: i64, assume_positive: bool) -> (Polarity, u32) {
    if grade < 0 {
        let polarity = if assume_positive {
            Polarity::Positive
        } else {
            Polarity::Negative
        };
        return (polarity, 0);
    }
    (Polarity::Positive, u32::try_from(grade).unwrap_or(u32::MAX))
}

/// Splits one CSV record, honoring double-quoted fields and `""` escapes.
pub fn split_csv_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);

    fields
}
