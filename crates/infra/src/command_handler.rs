//! Course command path: from validated request to emitted event.
//!
//! ```text
//! add / update                        delete
//!   ↓                                   ↓
//! build CourseEvent                   build CourseEvent
//!   ↓                                   ↓
//! publish (RetryPolicy)               tx: delete row + insert outbox row
//!   ↓                                   ↓
//! SubmitOutcome | Publish error       NotFound (nothing recorded)
//!                                     Deleted  → kick relay → bus
//! ```
//!
//! Add and update never touch the store: they are announced as soon as they
//! are accepted. A delete is announced only after the store confirms the row
//! was removed, and the event commits together with the removal.

use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use instructor_core::{Course, DomainError, OperationOutcome};
use instructor_events::{CourseEvent, EventPublisher, Operation, PublishError};

use crate::outbox::RelayTrigger;
use crate::retry::{RetryPolicy, publish_with_retry};
use crate::store::{CourseStore, DeleteOutcome, StoreError};

#[derive(Debug, Error)]
pub enum CommandError {
    /// Malformed payload or an operation routed to the wrong entry point.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Add/update could not be delivered within the retry policy.
    #[error("event {event_id} not delivered: {source}")]
    Publish {
        event_id: Uuid,
        #[source]
        source: PublishError,
    },
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                CommandError::Validation(msg)
            }
        }
    }
}

/// An add/update that reached the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub event_id: Uuid,
    /// Publish attempts it took, including the successful one.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractOutcome {
    /// Row removed; the event is committed to the outbox.
    Deleted { event_id: Uuid },
    NotFound,
}

impl RetractOutcome {
    pub fn outcome(&self) -> OperationOutcome {
        match self {
            RetractOutcome::Deleted { .. } => DeleteOutcome::Deleted,
            RetractOutcome::NotFound => DeleteOutcome::NotFound,
        }
        .into_operation_outcome()
    }

    pub fn event_id(&self) -> Option<Uuid> {
        match self {
            RetractOutcome::Deleted { event_id } => Some(*event_id),
            RetractOutcome::NotFound => None,
        }
    }
}

/// Turns course commands into events.
///
/// Holds only injected, already-initialized collaborators; safe to share
/// across request tasks behind an `Arc`.
#[derive(Debug)]
pub struct CourseCommandHandler<S, P> {
    store: S,
    publisher: P,
    retry: RetryPolicy,
    relay_trigger: Option<RelayTrigger>,
}

impl<S, P> CourseCommandHandler<S, P>
where
    S: CourseStore,
    P: EventPublisher,
{
    pub fn new(store: S, publisher: P, retry: RetryPolicy) -> Self {
        Self {
            store,
            publisher,
            retry,
            relay_trigger: None,
        }
    }

    /// Wake the outbox relay after every committed delete.
    pub fn with_relay_trigger(mut self, trigger: RelayTrigger) -> Self {
        self.relay_trigger = Some(trigger);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Announce an add or update.
    #[instrument(skip(self, payload), fields(course_id = %payload.id), err)]
    pub async fn submit(
        &self,
        operation: Operation,
        payload: Course,
    ) -> Result<SubmitOutcome, CommandError> {
        if operation == Operation::Delete {
            return Err(CommandError::Validation(
                "delete must go through retract".to_string(),
            ));
        }

        let event = CourseEvent::new(operation, payload)?;
        let event_id = event.event_id();

        match publish_with_retry(&self.publisher, event, &self.retry).await {
            Ok(attempts) => {
                info!(%event_id, attempts, "course event published");
                Ok(SubmitOutcome { event_id, attempts })
            }
            Err(source) => {
                warn!(%event_id, error = %source, "course event not published");
                Err(CommandError::Publish { event_id, source })
            }
        }
    }

    /// Delete a course, recording its event only if a row was removed.
    #[instrument(skip(self, payload), fields(course_id = %payload.id), err)]
    pub async fn retract(&self, payload: Course) -> Result<RetractOutcome, CommandError> {
        let event = CourseEvent::new(Operation::Delete, payload)?;
        let event_id = event.event_id();

        let outcome = self.store.delete_recording(&event).await.map_err(|err| {
            error!(%event_id, error = %err, "course delete failed");
            CommandError::Store(err)
        })?;

        match outcome {
            DeleteOutcome::Deleted => {
                if let Some(trigger) = &self.relay_trigger {
                    trigger.kick();
                }
                info!(%event_id, "course deleted, event recorded");
                Ok(RetractOutcome::Deleted { event_id })
            }
            DeleteOutcome::NotFound => {
                info!("course not found, nothing recorded");
                Ok(RetractOutcome::NotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use proptest::prelude::*;

    use super::*;
    use crate::outbox::{OutboxRelay, OutboxStore};
    use crate::store::InMemoryCourseStore;
    use instructor_core::{CourseId, CourseName};
    use instructor_events::InMemoryEventBus;

    type Handler = CourseCommandHandler<Arc<InMemoryCourseStore>, Arc<InMemoryEventBus>>;

    fn handler() -> (Handler, Arc<InMemoryCourseStore>, Arc<InMemoryEventBus>) {
        let store = Arc::new(InMemoryCourseStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = CourseCommandHandler::new(
            store.clone(),
            bus.clone(),
            RetryPolicy::fixed(3, Duration::from_millis(1)),
        );
        (handler, store, bus)
    }

    fn course(id: i32, name: &str) -> Course {
        Course::named(CourseId::new(id).unwrap(), CourseName::new(name).unwrap())
    }

    /// Store whose every call fails.
    struct UnreachableStore;

    #[async_trait]
    impl CourseStore for UnreachableStore {
        async fn exists(&self, _id: CourseId) -> Result<bool, StoreError> {
            Err(StoreError::Connection("connection refused".into()))
        }

        async fn insert(&self, _course: &Course) -> Result<(), StoreError> {
            Err(StoreError::Connection("connection refused".into()))
        }

        async fn delete(&self, _id: CourseId) -> Result<u64, StoreError> {
            Err(StoreError::Connection("connection refused".into()))
        }

        async fn delete_recording(&self, _event: &CourseEvent) -> Result<DeleteOutcome, StoreError> {
            Err(StoreError::Connection("connection refused".into()))
        }
    }

    proptest! {
        #[test]
        fn every_valid_submission_publishes_exactly_one_matching_event(
            id in 1i32..=i32::MAX,
            name in "[A-Za-z][A-Za-z0-9 ]{0,60}",
            update in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (handler, store, bus) = handler();
            let operation = if update { Operation::Update } else { Operation::Add };
            let payload = course(id, &name);

            let outcome = rt.block_on(handler.submit(operation, payload.clone())).unwrap();

            let published = bus.published();
            prop_assert_eq!(published.len(), 1);
            prop_assert_eq!(published[0].operation(), operation);
            prop_assert_eq!(published[0].event_id(), outcome.event_id);
            prop_assert_eq!(published[0].payload(), &payload);
            prop_assert!(store.courses().is_empty());
        }
    }

    #[tokio::test]
    async fn submit_rejects_missing_name_and_delete() {
        let (handler, _store, bus) = handler();
        let bare = Course::new(CourseId::new(1).unwrap(), None);

        assert!(matches!(
            handler.submit(Operation::Add, bare).await,
            Err(CommandError::Validation(_))
        ));
        assert!(matches!(
            handler.submit(Operation::Delete, course(1, "Algebra")).await,
            Err(CommandError::Validation(_))
        ));
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn transient_bus_failure_is_retried() {
        let (handler, _store, bus) = handler();
        bus.fail_next(2);

        let outcome = handler
            .submit(Operation::Add, course(1, "Algebra"))
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_publish_surfaces_an_error() {
        let (handler, _store, bus) = handler();
        bus.fail_next(3);

        let err = handler
            .submit(Operation::Update, course(1, "Algebra"))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Publish { .. }));
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn retract_of_missing_id_is_not_found_and_silent() {
        let (handler, store, bus) = handler();

        let outcome = handler.retract(course(42, "Ghost")).await.unwrap();

        assert_eq!(outcome, RetractOutcome::NotFound);
        assert_eq!(outcome.outcome(), OperationOutcome::not_found());
        assert!(store.outbox_snapshot().is_empty());
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn retract_removes_the_row_and_delivers_one_event() {
        let (handler, store, bus) = handler();
        store.insert(&course(1, "Algebra")).await.unwrap();

        let outcome = handler.retract(course(1, "Algebra")).await.unwrap();
        assert_eq!(outcome.outcome(), OperationOutcome::deleted());
        assert!(store.courses().is_empty());

        // Recorded, not yet delivered.
        assert_eq!(bus.published_count(), 0);

        let relay = OutboxRelay::new(store.clone(), bus.clone());
        relay.drain_once().await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].operation(), Operation::Delete);
        assert_eq!(Some(published[0].event_id()), outcome.event_id());
        assert_eq!(published[0].course_id(), CourseId::new(1).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_retracts_of_one_id_delete_once() {
        let (handler, store, bus) = handler();
        store.insert(&course(5, "Logic")).await.unwrap();
        let handler = Arc::new(handler);

        let a = tokio::spawn({
            let handler = handler.clone();
            async move { handler.retract(course(5, "Logic")).await }
        });
        let b = tokio::spawn({
            let handler = handler.clone();
            async move { handler.retract(course(5, "Logic")).await }
        });

        let mut outcomes = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        outcomes.sort_by_key(|o| o.event_id().is_none());

        assert!(matches!(outcomes[0], RetractOutcome::Deleted { .. }));
        assert_eq!(outcomes[1], RetractOutcome::NotFound);

        OutboxRelay::new(store.clone(), bus.clone())
            .drain_once()
            .await
            .unwrap();
        assert_eq!(bus.published_count(), 1);
        assert!(store.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_never_publishes() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = CourseCommandHandler::new(UnreachableStore, bus.clone(), RetryPolicy::no_retry());

        let err = handler.retract(course(1, "Algebra")).await.unwrap_err();

        assert!(matches!(err, CommandError::Store(StoreError::Connection(_))));
        assert_eq!(bus.published_count(), 0);
    }

    #[tokio::test]
    async fn committed_delete_kicks_the_relay() {
        let (handler, store, bus) = handler();
        let mut sub = bus.subscribe();
        let relay = OutboxRelay::new(store.clone(), bus.clone()).spawn(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let handler = handler.with_relay_trigger(relay.trigger());
        store.insert(&course(8, "Optics")).await.unwrap();
        let outcome = handler.retract(course(8, "Optics")).await.unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(delivered.event_id()), outcome.event_id());

        relay.shutdown().await;
    }
}
