use std::collections::BTreeMap;

use rusqlite::{Connection, Row, params};

use crate::error::{HarnessError, HarnessResult};
use crate::model::{Judgment, LabelSourceEntry, Polarity};

/// Read access to ground-truth judgments.
pub trait LabelStore {
    /// Every judgment in the store, in ingestion order.
    fn everything(&self) -> HarnessResult<Vec<Judgment>>;

    /// Judgments whose topic side or document side equals `id`.
    fn directly_connected(&self, id: &str) -> HarnessResult<Vec<Judgment>>;

    fn is_empty(&self) -> HarnessResult<bool> {
        Ok(self.everything()?.is_empty())
    }

    /// Judgments connecting `first` and `second`, in either direction.
    fn connecting(&self, first: &str, second: &str) -> HarnessResult<Vec<Judgment>> {
        Ok(self
            .directly_connected(first)?
            .into_iter()
            .filter(|judgment| judgment.connects(first, second))
            .collect())
    }
}

pub struct SqliteLabelStore {
    connection: Connection,
}

const JUDGMENT_COLUMNS: &str =
    "topic_id, document_id, subtopic_id, passage_offset, annotator, polarity, rating, meta_json";

impl SqliteLabelStore {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Inserts judgments in one transaction; an existing judgment with the
    /// same identity is replaced.
    pub fn put_all(&mut self, judgments: &[Judgment]) -> HarnessResult<usize> {
        let tx = self.connection.transaction()?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO labels(topic_id, document_id, subtopic_id, passage_offset, annotator, polarity, rating, meta_json)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(topic_id, document_id, subtopic_id, passage_offset, annotator) DO UPDATE SET
                  polarity=excluded.polarity,
                  rating=excluded.rating,
                  meta_json=excluded.meta_json
                ",
            )?;

            for judgment in judgments {
                let meta_json = serde_json::to_string(&judgment.meta)?;
                statement.execute(params![
                    judgment.topic_id,
                    judgment.document_id,
                    judgment.subtopic_id,
                    judgment.passage_offset,
                    judgment.annotator,
                    judgment.polarity.as_str(),
                    judgment.rating,
                    meta_json,
                ])?;
            }
        }

        tx.commit()?;
        Ok(judgments.len())
    }

    pub fn count(&self) -> HarnessResult<i64> {
        let count = self
            .connection
            .query_row("SELECT COUNT(*) FROM labels", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn topic_count(&self) -> HarnessResult<i64> {
        let count = self.connection.query_row(
            "SELECT COUNT(DISTINCT topic_id) FROM labels",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn record_source(&self, entry: &LabelSourceEntry) -> HarnessResult<()> {
        self.connection.execute(
            "
            INSERT INTO label_sources(source_path, sha256, format, loaded_at, labels_loaded, lines_skipped)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                entry.source_path,
                entry.sha256,
                entry.format,
                entry.loaded_at,
                entry.labels_loaded,
                entry.lines_skipped,
            ],
        )?;
        Ok(())
    }

    pub fn last_source(&self) -> HarnessResult<Option<LabelSourceEntry>> {
        let mut statement = self.connection.prepare(
            "
            SELECT source_path, sha256, format, loaded_at, labels_loaded, lines_skipped
            FROM label_sources
            ORDER BY source_id DESC
            LIMIT 1
            ",
        )?;
        let mut rows = statement.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        Ok(Some(LabelSourceEntry {
            source_path: row.get(0)?,
            sha256: row.get(1)?,
            format: row.get(2)?,
            loaded_at: row.get(3)?,
            labels_loaded: row.get(4)?,
            lines_skipped: row.get(5)?,
        }))
    }

    fn query_judgments(&self, sql: &str, id: Option<&str>) -> HarnessResult<Vec<Judgment>> {
        let mut statement = self.connection.prepare(sql)?;
        let mut rows = match id {
            Some(id) => statement.query(params![id])?,
            None => statement.query([])?,
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(judgment_from_row(row)?);
        }
        Ok(out)
    }
}

impl LabelStore for SqliteLabelStore {
    fn everything(&self) -> HarnessResult<Vec<Judgment>> {
        self.query_judgments(
            &format!("SELECT {JUDGMENT_COLUMNS} FROM labels ORDER BY label_id ASC"),
            None,
        )
    }

    fn directly_connected(&self, id: &str) -> HarnessResult<Vec<Judgment>> {
        self.query_judgments(
            &format!(
                "SELECT {JUDGMENT_COLUMNS} FROM labels
                 WHERE topic_id = ?1 OR document_id = ?1
                 ORDER BY label_id ASC"
            ),
            Some(id),
        )
    }

    fn is_empty(&self) -> HarnessResult<bool> {
        let exists: i64 =
            self.connection
                .query_row("SELECT EXISTS(SELECT 1 FROM labels)", [], |row| row.get(0))?;
        Ok(exists == 0)
    }
}

fn judgment_from_row(row: &Row<'_>) -> HarnessResult<Judgment> {
    let polarity_raw: String = row.get(5)?;
    let polarity = Polarity::parse(&polarity_raw).ok_or_else(|| {
        HarnessError::validation(format!("unknown judgment polarity in store: {polarity_raw}"))
    })?;
    let meta_json: String = row.get(7)?;
    let meta: BTreeMap<String, String> = serde_json::from_str(&meta_json)?;

    Ok(Judgment {
        topic_id: row.get(0)?,
        document_id: row.get(1)?,
        subtopic_id: row.get(2)?,
        passage_offset: row.get(3)?,
        annotator: row.get(4)?,
        polarity,
        rating: row.get(6)?,
        meta,
    })
}
