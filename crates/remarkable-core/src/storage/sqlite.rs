//! SQLite-backed event persistence.
//!
//! Each event is stored as one JSON document plus a few extracted columns
//! used for range queries and purge scans.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::data_dir;
use crate::content::rich::TIMESTAMP_FORMAT;
use crate::error::{CoreError, Result, StorageError};
use crate::event::{normalize_event, Event, EventDraft};
use crate::store::persistence::{in_time_range, EventPersistence};

/// SQLite database holding the event table.
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqlitePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePersistence").finish_non_exhaustive()
    }
}

impl SqlitePersistence {
    /// Open the database at `~/.config/remarkable/remarkable.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("remarkable.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id          TEXT PRIMARY KEY,
                start_time  TEXT,
                end_time    TEXT,
                is_task     INTEGER NOT NULL DEFAULT 0,
                deleted_at  TEXT,
                updated_at  TEXT NOT NULL,
                body        TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_start_time ON events(start_time);
            CREATE INDEX IF NOT EXISTS idx_events_end_time ON events(end_time);
            CREATE INDEX IF NOT EXISTS idx_events_deleted_at ON events(deleted_at);",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_rows(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Event>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, body, updated_at) = row?;
            match decode(&id, &body, &updated_at) {
                Ok(event) => events.push(event),
                Err(err) => warn!(
                    target: "remarkable::data_quality",
                    event_id = %id,
                    error = %err,
                    "skipping undecodable row"
                ),
            }
        }
        Ok(events)
    }
}

/// Decode a stored body. Rows written by older versions, or in a partial
/// shape, go through the draft path and come back normalized under the row's
/// own id; the repaired form is persisted on the next write.
fn decode(id: &str, body: &str, updated_at: &str) -> Result<Event> {
    let strict = match serde_json::from_str::<Event>(body) {
        Ok(event) => return Ok(event),
        Err(err) => err,
    };
    let draft: EventDraft = serde_json::from_str(body).map_err(|e| {
        CoreError::Storage(StorageError::Corrupt {
            id: id.to_string(),
            message: e.to_string(),
        })
    })?;
    warn!(
        target: "remarkable::data_quality",
        event_id = id,
        error = %strict,
        "repaired legacy row on read"
    );
    Ok(repair(id, draft, updated_at))
}

fn repair(id: &str, mut draft: EventDraft, updated_at: &str) -> Event {
    // The row id stays authoritative; the store re-keys malformed ids on write.
    draft.id = None;
    let stored_version = draft.local_version.unwrap_or(0);
    let stamp = DateTime::parse_from_rfc3339(updated_at)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or(draft.created_at)
        .unwrap_or_else(Utc::now);
    let mut event = normalize_event(draft, None, stamp);
    event.id = id.to_string();
    event.local_version = stored_version;
    event
}

fn time_column(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
}

#[async_trait]
impl EventPersistence for SqlitePersistence {
    async fn get(&self, id: &str) -> Result<Option<Event>> {
        let row: Option<(String, String)> = self
            .lock()
            .query_row(
                "SELECT body, updated_at FROM events WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(body, updated_at)| decode(id, &body, &updated_at))
            .transpose()
    }

    async fn put(&self, event: &Event) -> Result<()> {
        let body = serde_json::to_string(event)?;
        self.lock().execute(
            "INSERT INTO events (id, start_time, end_time, is_task, deleted_at, updated_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                start_time = excluded.start_time,
                end_time   = excluded.end_time,
                is_task    = excluded.is_task,
                deleted_at = excluded.deleted_at,
                updated_at = excluded.updated_at,
                body       = excluded.body",
            params![
                event.id,
                time_column(event.start_time),
                time_column(event.end_time),
                event.is_task,
                event.deleted_at.map(|t| t.to_rfc3339()),
                event.updated_at.to_rfc3339(),
                body,
            ],
        )?;
        Ok(())
    }

    async fn query_by_time_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>> {
        let (from, to) = (
            start.format(TIMESTAMP_FORMAT).to_string(),
            end.format(TIMESTAMP_FORMAT).to_string(),
        );
        let conn = self.lock();
        // Coarse filter in SQL, exact membership below.
        let candidates = Self::load_rows(
            &conn,
            "SELECT id, body, updated_at FROM events
             WHERE (start_time IS NULL OR start_time <= ?2)
               AND (end_time IS NULL OR end_time >= ?1)
             ORDER BY id",
            params![from, to],
        )?;
        Ok(candidates
            .into_iter()
            .filter(|e| in_time_range(e, start, end))
            .collect())
    }

    async fn query_all(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let conn = self.lock();
        Self::load_rows(
            &conn,
            "SELECT id, body, updated_at FROM events ORDER BY id LIMIT ?1",
            params![limit],
        )
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }
}
