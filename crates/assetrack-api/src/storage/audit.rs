use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use std::collections::VecDeque;

use super::{StoreError, StoreResult};
use crate::models::AuditEvent;

/// Append-only audit persistence
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()>;
}

/// PostgreSQL-backed audit store
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                actor_id, action, resource, resource_id, details,
                source_address, user_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&event.actor_id)
        .bind(event.action.as_str())
        .bind(&event.resource)
        .bind(&event.resource_id)
        .bind(&event.details)
        .bind(&event.source_address)
        .bind(&event.user_agent)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("append_audit_event", e))?;

        Ok(())
    }
}

/// Bounded in-memory audit store for development and tests. Once full, the
/// oldest event is dropped for each new one.
pub struct InMemoryAuditStore {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl InMemoryAuditStore {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Snapshot of retained events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, RequestMeta};

    #[tokio::test]
    async fn test_oldest_events_are_dropped_at_capacity() {
        let store = InMemoryAuditStore::with_capacity(3);
        let meta = RequestMeta::new(None, None);
        for n in 0..5 {
            let event = AuditEvent::new(AuditAction::Login, "auth", &meta).resource_id(n.to_string());
            store.append(&event).await.unwrap();
        }

        let kept: Vec<_> = store
            .events()
            .into_iter()
            .filter_map(|e| e.resource_id)
            .collect();
        assert_eq!(kept, ["2", "3", "4"]);
    }
}
