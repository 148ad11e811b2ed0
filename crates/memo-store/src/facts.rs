use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use memo_core::{Message, MessageId, Role, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::messages::insert_in;
use crate::row_helpers::RowReader;

/// A row of the long-term `facts` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    /// Same id as the context row it was promoted from.
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub source_session: Option<SessionId>,
    pub created_at: String,
}

/// A fact to be imported from a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFact {
    pub role: Role,
    pub content: String,
}

pub struct FactRepo {
    db: Database,
}

impl FactRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All long-term facts, oldest first.
    pub fn list(&self) -> Result<Vec<FactRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, source_session, created_at FROM facts ORDER BY seq ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let r = RowReader::new(row, "facts");
                results.push(FactRow {
                    id: MessageId::from_raw(r.get::<String>(0, "id")?),
                    role: r.role(1, "role")?,
                    content: r.get(2, "content")?,
                    source_session: r
                        .get::<Option<String>>(3, "source_session")?
                        .map(SessionId::from_raw),
                    created_at: r.get(4, "created_at")?,
                });
            }
            Ok(results)
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))?)
        })
    }

    /// Drop every long-term fact. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<usize, StoreError> {
        self.db.with_tx(remove_all)
    }

    /// Replace all long-term facts with `entries`, each recorded as a
    /// fact-flagged message of `session_id`. Either every entry lands or
    /// nothing changes.
    #[instrument(skip(self, entries), fields(session_id = %session_id, entries = entries.len()))]
    pub fn replace(
        &self,
        session_id: &SessionId,
        entries: &[NewFact],
    ) -> Result<Vec<Message>, StoreError> {
        self.db.with_tx(|conn| {
            let removed = remove_all(conn)?;
            let imported = entries
                .iter()
                .map(|fact| insert_in(conn, session_id, fact.role, &fact.content, true))
                .collect::<Result<Vec<_>, _>>()?;
            info!(removed, imported = imported.len(), "facts replaced");
            Ok(imported)
        })
    }
}

/// Delete every fact and take each one back out of its source session's
/// `facts_count`.
fn remove_all(conn: &rusqlite::Connection) -> Result<usize, StoreError> {
    conn.execute(
        "UPDATE sessions SET facts_count = MAX(0, facts_count - \
             (SELECT COUNT(*) FROM facts WHERE facts.source_session = sessions.id)) \
         WHERE id IN (SELECT source_session FROM facts)",
        [],
    )?;
    Ok(conn.execute("DELETE FROM facts", [])?)
}
