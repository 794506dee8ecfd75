//! Session store: responder descriptors keyed by session id.
//!
//! The relay only talks to the [`SessionStore`] trait. Two backends ship:
//!
//! - [`MemoryStore`] - process-lifetime table
//! - [`SqliteStore`] - `sessions` table in SQLite (feature `sqlite`)
//!
//! Sessions never expire on their own; they are replaced on re-registration
//! and removed by [`SessionStore::delete_session`].

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Where a session's RPC calls go, and which protocols it speaks there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponder {
    pub url: Url,
    pub protocols: Vec<String>,
}

impl SessionResponder {
    pub fn new(url: Url, protocols: Vec<String>) -> Self {
        Self { url, protocols }
    }

    /// Check the descriptor invariants shared by every backend.
    ///
    /// # Errors
    ///
    /// - `EmptyProtocols` when no protocol is listed
    /// - `InvalidProtocol` when an entry is empty or contains `,`
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.protocols.is_empty() {
            return Err(StoreError::EmptyProtocols);
        }
        if let Some(bad) = self.protocols.iter().find(|p| p.is_empty() || p.contains(',')) {
            return Err(StoreError::InvalidProtocol {
                protocol: bad.clone(),
            });
        }
        Ok(())
    }

    /// Requested protocols this responder does not speak, in request order.
    pub fn unsupported<'a>(&self, requested: &'a [String]) -> Vec<&'a String> {
        requested
            .iter()
            .filter(|p| !self.protocols.contains(p))
            .collect()
    }
}

/// Session store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A responder must list at least one protocol.
    #[error("responder must support at least one protocol")]
    EmptyProtocols,

    /// A protocol entry is empty or contains `,`.
    #[error("invalid protocol '{protocol}'")]
    InvalidProtocol { protocol: String },

    /// A persisted row could not be turned back into a responder.
    #[error("stored session '{session_id}' is corrupt: {reason}")]
    InvalidRow { session_id: String, reason: String },

    /// The backend itself failed.
    #[error("session store backend failure: {0}")]
    Backend(String),
}

/// Storage contract for session-to-responder bindings.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the responder of `session_id`.
    async fn set_responder(
        &self,
        session_id: &str,
        responder: SessionResponder,
    ) -> Result<(), StoreError>;

    /// Fetch the responder of `session_id`, `None` if unknown.
    async fn get_responder(&self, session_id: &str)
    -> Result<Option<SessionResponder>, StoreError>;

    /// Remove `session_id`. Removing an unknown session is not an error.
    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError>;
}
