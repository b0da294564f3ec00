pub mod demo;
pub mod load;
pub mod score;
pub mod session;
pub mod status;

use anyhow::Result;

use crate::config::HarnessConfig;
use crate::harness::{RunLogWriter, SessionStore};
use crate::labels::SqliteLabelStore;
use crate::store::open_database;

/// Opens the label store and the session store over the configured database.
fn open_stores(config: &HarnessConfig) -> Result<(SqliteLabelStore, SessionStore)> {
    let labels = SqliteLabelStore::new(open_database(&config.db_path)?);
    let session = SessionStore::open(open_database(&config.db_path)?)?;
    Ok((labels, session))
}

fn run_log(config: &HarnessConfig) -> Option<RunLogWriter> {
    config.run_file_path.as_deref().map(RunLogWriter::new)
}
