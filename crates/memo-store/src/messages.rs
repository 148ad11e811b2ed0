use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, instrument};

use memo_core::{Message, MessageId, Role, SessionId};

use crate::database::Database;
use crate::error::{validate_id, StoreError};
use crate::row_helpers::{escape_like, RowReader};
use crate::sessions::bump_facts_count;

const SELECT_COLUMNS: &str = "SELECT id, session_id, role, content, is_fact, seq, created_at FROM context";

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a message. Fact-flagged messages are mirrored into the `facts`
    /// table in the same transaction.
    #[instrument(skip(self, content))]
    pub fn insert(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
        is_fact: bool,
    ) -> Result<Message, StoreError> {
        self.db
            .with_tx(|conn| insert_in(conn, session_id, role, content, is_fact))
    }

    pub fn get(&self, id: &MessageId) -> Result<Message, StoreError> {
        validate_id(id.as_str())?;
        self.db.with_conn(|conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_message(row),
                None => Err(StoreError::NotFound(format!("message {id}"))),
            }
        })
    }

    /// All messages of a session, oldest first.
    pub fn list(&self, session_id: &SessionId) -> Result<Vec<Message>, StoreError> {
        self.query_session(session_id, "", &[])
    }

    /// Fact-flagged messages of a session, oldest first.
    pub fn list_facts(&self, session_id: &SessionId) -> Result<Vec<Message>, StoreError> {
        self.query_session(session_id, "AND is_fact = 1", &[])
    }

    /// Case-insensitive substring search over a session's messages, oldest first.
    pub fn search(&self, session_id: &SessionId, keyword: &str) -> Result<Vec<Message>, StoreError> {
        let pattern = format!("%{}%", escape_like(keyword));
        self.query_session(session_id, "AND content LIKE ?2 ESCAPE '\\'", &[&pattern as &dyn rusqlite::types::ToSql])
    }

    fn query_session(
        &self,
        session_id: &SessionId,
        filter: &str,
        extra: &[&dyn rusqlite::types::ToSql],
    ) -> Result<Vec<Message>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE session_id = ?1 {filter} ORDER BY seq ASC");
            let mut stmt = conn.prepare(&sql)?;
            let sid = session_id.as_str();
            let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(1 + extra.len());
            params.push(&sid);
            params.extend_from_slice(extra);
            let mut rows = stmt.query(params.as_slice())?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }

    /// Delete one message and, if it was a fact, its `facts` mirror.
    /// Returns `false` when no message had that id.
    #[instrument(skip(self), fields(message_id = %id))]
    pub fn delete(&self, id: &MessageId) -> Result<bool, StoreError> {
        validate_id(id.as_str())?;
        self.db.with_tx(|conn| {
            let found: Option<(String, bool)> = {
                let mut stmt = conn.prepare("SELECT session_id, is_fact FROM context WHERE id = ?1")?;
                let mut rows = stmt.query([id.as_str()])?;
                match rows.next()? {
                    Some(row) => {
                        let r = RowReader::new(row, "context");
                        Some((r.get(0, "session_id")?, r.get(1, "is_fact")?))
                    }
                    None => None,
                }
            };

            let Some((session_id, is_fact)) = found else {
                return Ok(false);
            };

            if is_fact {
                conn.execute("DELETE FROM facts WHERE id = ?1", [id.as_str()])?;
                bump_facts_count(conn, &session_id, -1)?;
            }
            conn.execute("DELETE FROM context WHERE id = ?1", [id.as_str()])?;
            debug!(is_fact, "message deleted");
            Ok(true)
        })
    }

    /// Wipe every message and every fact.
    #[instrument(skip(self))]
    pub fn delete_all(&self) -> Result<(), StoreError> {
        self.db.with_tx(|conn| {
            conn.execute("DELETE FROM context", [])?;
            conn.execute("DELETE FROM facts", [])?;
            conn.execute("UPDATE sessions SET facts_count = 0", [])?;
            Ok(())
        })
    }

    /// Empty the context table. Long-term fact rows are kept.
    #[instrument(skip(self))]
    pub fn clear_context(&self) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM context", [])?;
            Ok(())
        })
    }

    /// Remove the context rows of sessions that have ended. Returns how many
    /// rows went.
    #[instrument(skip(self))]
    pub fn prune_closed(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM context WHERE session_id IN \
                 (SELECT id FROM sessions WHERE end_time IS NOT NULL)",
                [],
            )?)
        })
    }
}

/// Insert a message on an open connection or transaction.
pub(crate) fn insert_in(
    conn: &Connection,
    session_id: &SessionId,
    role: Role,
    content: &str,
    is_fact: bool,
) -> Result<Message, StoreError> {
    let id = MessageId::new();
    let now = Utc::now().to_rfc3339();
    let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM context", [], |row| {
        row.get(0)
    })?;

    conn.execute(
        "INSERT INTO context (id, session_id, seq, role, content, is_fact, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id.as_str(),
            session_id.as_str(),
            seq,
            role.as_str(),
            content,
            is_fact,
            now,
        ],
    )?;

    if is_fact {
        conn.execute(
            "INSERT INTO facts (id, seq, role, content, source_session, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id.as_str(), seq, role.as_str(), content, session_id.as_str(), now],
        )?;
        bump_facts_count(conn, session_id.as_str(), 1)?;
    }

    Ok(Message {
        id,
        session_id: session_id.clone(),
        role,
        content: content.to_string(),
        is_fact,
        seq,
        created_at: now,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, StoreError> {
    let r = RowReader::new(row, "context");
    Ok(Message {
        id: MessageId::from_raw(r.get::<String>(0, "id")?),
        session_id: SessionId::from_raw(r.get::<String>(1, "session_id")?),
        role: r.role(2, "role")?,
        content: r.get(3, "content")?,
        is_fact: r.get(4, "is_fact")?,
        seq: r.get(5, "seq")?,
        created_at: r.get(6, "created_at")?,
    })
}
