//! In-memory session store.

use dashmap::DashMap;
use tracing::debug;

use super::{SessionResponder, SessionStore, StoreError};

/// `DashMap`-backed store; contents live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, SessionResponder>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn set_responder(
        &self,
        session_id: &str,
        responder: SessionResponder,
    ) -> Result<(), StoreError> {
        responder.validate()?;
        debug!(session_id = %session_id, url = %responder.url, "Storing responder");
        self.sessions.insert(session_id.to_string(), responder);
        Ok(())
    }

    async fn get_responder(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionResponder>, StoreError> {
        Ok(self.sessions.get(session_id).map(|r| r.value().clone()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn responder(url: &str, protocols: &[&str]) -> SessionResponder {
        SessionResponder::new(
            Url::parse(url).unwrap(),
            protocols.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store
            .set_responder("abc", responder("http://r.example/rpc", &["x", "y"]))
            .await
            .unwrap();

        assert_eq!(
            store.get_responder("abc").await.unwrap(),
            Some(responder("http://r.example/rpc", &["x", "y"]))
        );

        store.delete_session("abc").await.unwrap();
        assert_eq!(store.get_responder("abc").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_none() {
        assert_eq!(MemoryStore::new().get_responder("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let store = MemoryStore::new();
        store
            .set_responder("abc", responder("http://one.example/", &["x"]))
            .await
            .unwrap();
        store
            .set_responder("abc", responder("http://two.example/", &["y"]))
            .await
            .unwrap();

        let stored = store.get_responder("abc").await.unwrap().unwrap();
        assert_eq!(stored.url.as_str(), "http://two.example/");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_protocols_rejected() {
        let store = MemoryStore::new();
        let err = store
            .set_responder("abc", responder("http://r.example/", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyProtocols));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_protocol_entry_rejected() {
        let store = MemoryStore::new();
        for protocols in [&["x", ""][..], &["a,b"][..]] {
            let err = store
                .set_responder("abc", responder("http://r.example/", protocols))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidProtocol { .. }));
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_is_ok() {
        MemoryStore::new().delete_session("nope").await.unwrap();
    }
}
