//! In-memory event bus for tests/dev.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bus::{EventPublisher, PublishError, Subscription};
use crate::event::CourseEvent;

#[derive(Debug, Default)]
struct BusState {
    published: Vec<CourseEvent>,
    subscribers: Vec<mpsc::UnboundedSender<CourseEvent>>,
    failures_left: usize,
}

/// In-memory pub/sub bus.
///
/// - No IO
/// - Keeps every delivered event so tests can assert on what was emitted
/// - Best-effort fan-out to live subscribers
/// - Can be told to reject the next N publishes to exercise retry paths
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    state: Mutex<BusState>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<CourseEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut state) = self.state.lock() {
            state.subscribers.push(tx);
        }

        Subscription::new(rx)
    }

    /// Reject the next `n` publishes with a transport error.
    pub fn fail_next(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.failures_left = n;
        }
    }

    /// Snapshot of every successfully published event, in publish order.
    pub fn published(&self) -> Vec<CourseEvent> {
        self.state
            .lock()
            .map(|s| s.published.clone())
            .unwrap_or_default()
    }

    pub fn published_count(&self) -> usize {
        self.state.lock().map(|s| s.published.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: CourseEvent) -> Result<(), PublishError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PublishError::transport("in-memory bus lock poisoned"))?;

        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(PublishError::transport("in-memory bus rejected publish"));
        }

        // Drop any dead subscribers while publishing.
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        state.published.push(event);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Operation;
    use instructor_core::{Course, CourseId, CourseName};

    fn add_event(id: i32) -> CourseEvent {
        let course = Course::named(CourseId::new(id).unwrap(), CourseName::new("Algebra").unwrap());
        CourseEvent::new(Operation::Add, course).unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe();

        let ev = add_event(1);
        bus.publish(ev.clone()).await.unwrap();

        assert_eq!(sub.recv().await, Some(ev.clone()));
        assert_eq!(bus.published(), vec![ev]);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::new();
        drop(bus.subscribe());

        bus.publish(add_event(1)).await.unwrap();
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_not_recorded() {
        let bus = InMemoryEventBus::new();
        bus.fail_next(2);

        assert!(bus.publish(add_event(1)).await.is_err());
        let err = bus.publish(add_event(2)).await.unwrap_err();
        assert!(err.is_retryable());
        bus.publish(add_event(3)).await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].course_id().get(), 3);
    }
}
