//! Event publishing abstraction (mechanics only).
//!
//! The publisher is the seam between the command path and the message bus.
//! It makes minimal assumptions about the transport:
//!
//! - **Explicit result**: `publish()` reports success or failure; callers
//!   decide whether to retry, dead-letter, or surface the failure
//! - **No ordering guarantees**: events may arrive out of order
//! - **No persistence**: the bus distributes, the outbox is what survives a crash
//!
//! Consumers must be idempotent and deduplicate by `CourseEvent::event_id`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::CourseEvent;

/// Failure to hand an event to the bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The bus could not be reached or refused the write. Worth retrying.
    #[error("bus transport error: {0}")]
    Transport(String),

    /// The event could not be encoded for the wire. Retrying will not help.
    #[error("event serialization error: {0}")]
    Serialize(String),
}

impl PublishError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transport(_))
    }
}

/// Hands course events to a message bus.
///
/// Ownership of the event moves into the publisher. Implementations must be
/// safe to share across tasks.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: CourseEvent) -> Result<(), PublishError>;
}

#[async_trait]
impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    async fn publish(&self, event: CourseEvent) -> Result<(), PublishError> {
        (**self).publish(event).await
    }
}

/// A subscription to the events flowing through an in-process bus.
///
/// Each subscription receives a copy of every event published after it was
/// created (broadcast semantics).
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}
