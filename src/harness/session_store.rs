use std::collections::VecDeque;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::HarnessResult;
use crate::model::Topic;

const ROSTER_KEY: &str = "roster";
const AWAITING_STOP_KEY: &str = "awaiting_stop";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub roster: VecDeque<Topic>,
    pub awaiting_stop: bool,
}

impl SessionState {
    pub fn current_topic(&self) -> Option<&Topic> {
        self.roster.front()
    }
}

/// Durable session state kept in the `session_state` key-value table.
///
/// The in-memory copy is only replaced after a write commits.
pub struct SessionStore {
    connection: Connection,
    state: SessionState,
}

impl SessionStore {
    pub fn open(connection: Connection) -> HarnessResult<Self> {
        let roster: Option<Vec<Topic>> = read_value(&connection, ROSTER_KEY)?;
        let awaiting_stop: Option<bool> = read_value(&connection, AWAITING_STOP_KEY)?;

        let state = SessionState {
            roster: roster.unwrap_or_default().into(),
            awaiting_stop: awaiting_stop.unwrap_or(false),
        };

        Ok(Self { connection, state })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Applies `change` to a copy of the state and persists it in one
    /// transaction before exposing it.
    pub fn update<T>(&mut self, change: impl FnOnce(&mut SessionState) -> T) -> HarnessResult<T> {
        let mut next = self.state.clone();
        let outcome = change(&mut next);
        self.persist(&next)?;
        self.state = next;
        Ok(outcome)
    }

    fn persist(&mut self, state: &SessionState) -> HarnessResult<()> {
        let tx = self.connection.transaction()?;
        write_value(&tx, ROSTER_KEY, &state.roster)?;
        write_value(&tx, AWAITING_STOP_KEY, &state.awaiting_stop)?;
        tx.commit()?;
        Ok(())
    }
}

fn read_value<T: DeserializeOwned>(connection: &Connection, key: &str) -> HarnessResult<Option<T>> {
    let raw: Option<String> = connection
        .query_row(
            "SELECT value FROM session_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn write_value<T: Serialize + ?Sized>(connection: &Connection, key: &str, value: &T) -> HarnessResult<()> {
    let raw = serde_json::to_string(value)?;
    connection.execute(
        "INSERT INTO session_state(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, raw],
    )?;
    Ok(())
}
