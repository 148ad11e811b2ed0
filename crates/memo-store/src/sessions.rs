use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use memo_core::SessionId;

use crate::database::Database;
use crate::error::{validate_id, StoreError};
use crate::row_helpers::RowReader;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub start_time: String,
    /// `None` while the session is active.
    pub end_time: Option<String>,
    pub facts_count: i64,
}

impl SessionRow {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a new active session, closing any session that was left open.
    #[instrument(skip(self))]
    pub fn open(&self) -> Result<SessionRow, StoreError> {
        let id = SessionId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|conn| {
            let closed = conn.execute(
                "UPDATE sessions SET end_time = ?1 WHERE end_time IS NULL",
                [&now],
            )?;
            if closed > 0 {
                info!(closed, "closed dangling open session(s)");
            }

            conn.execute(
                "INSERT INTO sessions (id, start_time, facts_count) VALUES (?1, ?2, 0)",
                rusqlite::params![id.as_str(), now],
            )?;

            Ok(SessionRow {
                id,
                start_time: now.clone(),
                end_time: None,
                facts_count: 0,
            })
        })
    }

    /// Stamp the session's end time. Returns `false` if it was already closed.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn close(&self, id: &SessionId) -> Result<bool, StoreError> {
        validate_id(id.as_str())?;
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE sessions SET end_time = ?1 WHERE id = ?2 AND end_time IS NULL",
                rusqlite::params![now, id.as_str()],
            )?;
            if rows == 0 && !exists(conn, id)? {
                return Err(StoreError::NotFound(format!("session {id}")));
            }
            Ok(rows > 0)
        })
    }

    pub fn get(&self, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, start_time, end_time, facts_count FROM sessions WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// The currently open session, if any.
    pub fn active(&self) -> Result<Option<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, start_time, end_time, facts_count FROM sessions
                 WHERE end_time IS NULL ORDER BY start_time DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_session(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn count_open(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE end_time IS NULL",
                [],
                |row| row.get(0),
            )?)
        })
    }

    /// List sessions, newest first.
    pub fn list(&self, limit: u32) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, start_time, end_time, facts_count FROM sessions
                 ORDER BY start_time DESC, rowid DESC LIMIT ?1",
            )?;
            let mut rows = stmt.query([limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }
}

fn exists(conn: &Connection, id: &SessionId) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Adjust the live fact counter for a session.
pub(crate) fn bump_facts_count(
    conn: &Connection,
    session_id: &str,
    delta: i64,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE sessions SET facts_count = MAX(facts_count + ?1, 0) WHERE id = ?2",
        rusqlite::params![delta, session_id],
    )?;
    Ok(())
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    let r = RowReader::new(row, "sessions");
    Ok(SessionRow {
        id: SessionId::from_raw(r.get::<String>(0, "id")?),
        start_time: r.get(1, "start_time")?,
        end_time: r.get(2, "end_time")?,
        facts_count: r.get(3, "facts_count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SessionRepo {
        SessionRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn open_creates_active_session() {
        let repo = repo();
        let session = repo.open().unwrap();
        assert!(session.id.as_str().starts_with("sess_"));
        assert!(session.is_active());
        assert_eq!(repo.active().unwrap().unwrap().id, session.id);
    }

    #[test]
    fn opening_twice_leaves_one_open_session() {
        let repo = repo();
        let first = repo.open().unwrap();
        let second = repo.open().unwrap();

        assert_eq!(repo.count_open().unwrap(), 1);
        assert!(!repo.get(&first.id).unwrap().is_active());
        assert_eq!(repo.active().unwrap().unwrap().id, second.id);
    }

    #[test]
    fn close_stamps_end_time() {
        let repo = repo();
        let session = repo.open().unwrap();
        assert!(repo.close(&session.id).unwrap());
        assert!(repo.get(&session.id).unwrap().end_time.is_some());
        assert!(repo.active().unwrap().is_none());
    }

    #[test]
    fn closing_twice_is_a_noop() {
        let repo = repo();
        let session = repo.open().unwrap();
        assert!(repo.close(&session.id).unwrap());
        assert!(!repo.close(&session.id).unwrap());
    }

    #[test]
    fn close_unknown_session_fails() {
        let repo = repo();
        let result = repo.close(&SessionId::from_raw("sess_missing"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn close_malformed_id_fails() {
        let repo = repo();
        let result = repo.close(&SessionId::from_raw(""));
        assert!(matches!(result, Err(StoreError::InvalidId(_))));
    }

    #[test]
    fn list_returns_newest_first() {
        let repo = repo();
        let a = repo.open().unwrap();
        let b = repo.open().unwrap();
        let all = repo.list(10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id);
        assert_eq!(all[1].id, a.id);
    }
}
