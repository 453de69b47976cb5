//! Transactional outbox for delete events.
//!
//! A delete writes its `CourseEvent` into `course_outbox` in the same
//! transaction that removes the row. The relay then drains pending rows to
//! the bus, at-least-once:
//!
//! ```text
//! DELETE request → [tx: delete row + insert outbox row] → 200
//!                                  ↓
//!                     OutboxRelay (tick or kick) → EventPublisher
//!                                  ↓
//!              published | failed (retry next tick) | dead-lettered
//! ```
//!
//! Consumers deduplicate by `event_id`: a crash between publish and
//! `mark_published` redelivers the same event.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use instructor_events::CourseEvent;

use crate::store::StoreError;

pub mod relay;

pub use relay::{OutboxRelay, RelayHandle, RelayReport, RelayTrigger};

/// A recorded event awaiting (or done with) delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxRecord {
    pub event: CourseEvent,
    /// Delivery attempts made so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    pub fn new(event: CourseEvent) -> Self {
        Self {
            event,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Outbox rows as seen by the relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest undelivered, not dead-lettered rows first.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError>;

    async fn mark_published(&self, event_id: Uuid) -> Result<(), StoreError>;

    /// Count a failed attempt; `dead_letter` parks the row for good.
    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), StoreError>;

    async fn dead_lettered(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError>;
}

#[async_trait]
impl<S> OutboxStore for Arc<S>
where
    S: OutboxStore + ?Sized,
{
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        (**self).pending(limit).await
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), StoreError> {
        (**self).mark_published(event_id).await
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), StoreError> {
        (**self).mark_failed(event_id, error, dead_letter).await
    }

    async fn dead_lettered(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        (**self).dead_lettered(limit).await
    }
}
