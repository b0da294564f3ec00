use anyhow::Result;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::harness::SessionStore;
use crate::labels::SqliteLabelStore;
use crate::model::StatusResponse;
use crate::store::{open_database_read_only, read_metadata};
use crate::util::write_json_stdout;

pub fn run(config: &HarnessConfig, one_line: bool) -> Result<()> {
    let db_path = &config.db_path;
    info!(db = %db_path.display(), "status requested");

    let mut response = StatusResponse {
        db_path: db_path.display().to_string(),
        db_schema_version: None,
        total_labels: 0,
        num_topics: 0,
        roster_remaining: 0,
        current_topic: None,
        awaiting_stop: false,
        last_load: None,
    };

    if db_path.exists() {
        let connection = open_database_read_only(db_path)?;
        response.db_schema_version = read_metadata(&connection, "db_schema_version")?;

        let labels = SqliteLabelStore::new(connection);
        response.total_labels = labels.count()?;
        response.num_topics = labels.topic_count()?;
        response.last_load = labels.last_source()?;

        let session = SessionStore::open(open_database_read_only(db_path)?)?;
        let state = session.state();
        response.roster_remaining = state.roster.len();
        response.current_topic = state.current_topic().cloned();
        response.awaiting_stop = state.awaiting_stop;

        info!(
            labels = response.total_labels,
            topics = response.num_topics,
            roster_remaining = response.roster_remaining,
            awaiting_stop = response.awaiting_stop,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    write_json_stdout(&response, one_line)
}
