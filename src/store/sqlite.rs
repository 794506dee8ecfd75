//! SQLite-backed session store.
//!
//! Schema:
//!
//! ```sql
//! sessions(id TEXT PRIMARY KEY, responder_url TEXT, responder_protocols TEXT,
//!          created_at DATETIME DEFAULT CURRENT_TIMESTAMP)
//! ```
//!
//! Protocols are stored comma-separated. Every call runs on the blocking
//! pool so the async runtime never waits on disk I/O.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use url::Url;

use super::{SessionResponder, SessionStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    responder_url TEXT,
    responder_protocols TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
";

/// Session store persisted in a SQLite database.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            StoreError::Backend(format!("failed to open session database: {e}"))
        })?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Backend(format!("failed to open session database: {e}"))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(|e| {
            StoreError::Backend(format!("failed to initialize session schema: {e}"))
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| StoreError::Backend(format!("session store task failed: {e}")))?
    }
}

fn parse_row(session_id: &str, url: String, protocols: String) -> Result<SessionResponder, StoreError> {
    let invalid = |reason: String| StoreError::InvalidRow {
        session_id: session_id.to_string(),
        reason,
    };

    let url = Url::parse(&url).map_err(|e| invalid(format!("invalid responder URL '{url}': {e}")))?;
    let protocols: Vec<String> = protocols.split(',').map(str::to_string).collect();
    if protocols.iter().any(String::is_empty) {
        return Err(invalid("empty protocol entry".to_string()));
    }
    Ok(SessionResponder { url, protocols })
}

#[async_trait::async_trait]
impl SessionStore for SqliteStore {
    async fn set_responder(
        &self,
        session_id: &str,
        responder: SessionResponder,
    ) -> Result<(), StoreError> {
        responder.validate()?;

        debug!(session_id = %session_id, url = %responder.url, "Storing responder");
        let id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, responder_url, responder_protocols)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    responder_url = excluded.responder_url,
                    responder_protocols = excluded.responder_protocols",
                params![id, responder.url.as_str(), responder.protocols.join(",")],
            )
            .map_err(|e| StoreError::Backend(format!("failed to store session: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn get_responder(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionResponder>, StoreError> {
        let id = session_id.to_string();
        self.with_conn(move |conn| {
            let row: Option<(Option<String>, Option<String>)> = conn
                .query_row(
                    "SELECT responder_url, responder_protocols FROM sessions WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| StoreError::Backend(format!("failed to query session: {e}")))?;

            match row {
                None => Ok(None),
                Some((Some(url), Some(protocols))) => parse_row(&id, url, protocols).map(Some),
                Some(_) => Err(StoreError::InvalidRow {
                    session_id: id,
                    reason: "responder columns are NULL".to_string(),
                }),
            }
        })
        .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])
                .map_err(|e| StoreError::Backend(format!("failed to delete session: {e}")))?;
            Ok(())
        })
        .await
    }
}
