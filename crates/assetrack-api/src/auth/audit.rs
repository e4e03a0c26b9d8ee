//! Best-effort security audit trail

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::models::AuditEvent;
use crate::storage::AuditStore;

/// Fire-and-forget audit recorder.
///
/// Writes run on their own task, so a slow or failing audit store never
/// delays a response and a client disconnect never cancels a write.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
}

impl AuditSink {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Queue an event. The handle only matters to tests; callers drop it.
    pub fn record(&self, event: AuditEvent) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append(&event).await {
                warn!(
                    action = %event.action,
                    actor = %event.actor_id,
                    "Failed to write audit event: {}",
                    e
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, RequestMeta};
    use crate::storage::{InMemoryAuditStore, StoreError, StoreResult};
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl AuditStore for BrokenStore {
        async fn append(&self, _event: &AuditEvent) -> StoreResult<()> {
            Err(StoreError::Unavailable("audit table locked".into()))
        }
    }

    #[tokio::test]
    async fn test_events_reach_the_store() {
        let store = Arc::new(InMemoryAuditStore::new());
        let sink = AuditSink::new(store.clone());

        sink.record(AuditEvent::new(
            AuditAction::Login,
            "auth",
            &RequestMeta::unknown(),
        ))
        .await
        .unwrap();

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_address, "unknown");
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let sink = AuditSink::new(Arc::new(BrokenStore));
        let handle = sink.record(AuditEvent::new(
            AuditAction::AccessDenied,
            "users",
            &RequestMeta::unknown(),
        ));
        assert!(handle.await.is_ok());
    }
}
