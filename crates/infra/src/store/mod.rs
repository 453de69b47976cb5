//! Store gateway: the relational side of the command path.
//!
//! The store is only consulted for deletes. A delete removes the row and
//! records the matching `CourseEvent` in the outbox inside one transaction,
//! so there is no window between "row gone" and "event durable".
//!
//! ## Error Mapping
//!
//! Backend errors are mapped to `StoreError`:
//!
//! | Backend failure | StoreError |
//! |-----------------|------------|
//! | Pool/connect failure, pool closed, acquire timeout | `Connection` |
//! | Unique violation (`23505`) | `Conflict` |
//! | Any other query failure | `Query` |
//! | Outbox row that no longer decodes | `Corrupt` |

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

use instructor_core::{Course, CourseId, OperationOutcome};
use instructor_events::CourseEvent;

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryConnectionFactory, InMemoryCourseStore};
pub use postgres::{PgConnectionFactory, PgCourseStore};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store query error: {0}")]
    Query(String),

    #[error("course already exists: {0}")]
    Conflict(String),

    #[error("corrupt outbox row: {0}")]
    Corrupt(String),
}

/// Result of the atomic delete.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row existed, was removed, and its event is in the outbox.
    Deleted,
    /// Zero rows affected; nothing was recorded.
    NotFound,
}

impl DeleteOutcome {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        }
    }

    pub fn into_operation_outcome(self) -> OperationOutcome {
        match self {
            DeleteOutcome::Deleted => OperationOutcome::deleted(),
            DeleteOutcome::NotFound => OperationOutcome::not_found(),
        }
    }
}

/// Course persistence as seen by the command path.
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Whether a row with `id` is currently present.
    ///
    /// Not linked to any later delete; use `delete_recording` for decisions.
    async fn exists(&self, id: CourseId) -> Result<bool, StoreError>;

    /// Insert a new row. Duplicate ids fail with `StoreError::Conflict`.
    async fn insert(&self, course: &Course) -> Result<(), StoreError>;

    /// Remove the row by primary key, returning rows affected (0 when absent).
    async fn delete(&self, id: CourseId) -> Result<u64, StoreError>;

    /// Delete `event.course_id()` and, when a row was removed, append `event`
    /// to the outbox in the same transaction.
    async fn delete_recording(&self, event: &CourseEvent) -> Result<DeleteOutcome, StoreError>;
}

#[async_trait]
impl<S> CourseStore for Arc<S>
where
    S: CourseStore + ?Sized,
{
    async fn exists(&self, id: CourseId) -> Result<bool, StoreError> {
        (**self).exists(id).await
    }

    async fn insert(&self, course: &Course) -> Result<(), StoreError> {
        (**self).insert(course).await
    }

    async fn delete(&self, id: CourseId) -> Result<u64, StoreError> {
        (**self).delete(id).await
    }

    async fn delete_recording(&self, event: &CourseEvent) -> Result<DeleteOutcome, StoreError> {
        (**self).delete_recording(event).await
    }
}

/// Opens a store: connection pool plus schema binding.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Store: CourseStore + Clone + 'static;

    async fn connect(&self) -> Result<Self::Store, StoreError>;
}

/// Owns the store handle for the process.
///
/// The handle is created at most once, even when many tasks race on the
/// first call to `ensure_initialized`. Process bootstrap calls it explicitly
/// before serving traffic; later calls return the cached handle.
pub struct StoreGateway<F: ConnectionFactory> {
    factory: F,
    store: OnceCell<F::Store>,
}

impl<F: ConnectionFactory> StoreGateway<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            store: OnceCell::new(),
        }
    }

    /// Connect and bind the schema on first use; no-op afterwards.
    #[instrument(skip(self), err)]
    pub async fn ensure_initialized(&self) -> Result<&F::Store, StoreError> {
        self.store
            .get_or_try_init(|| async {
                let store = self.factory.connect().await?;
                info!("course store initialized");
                Ok::<_, StoreError>(store)
            })
            .await
    }

    pub fn is_initialized(&self) -> bool {
        self.store.initialized()
    }
}

impl<F: ConnectionFactory> core::fmt::Debug for StoreGateway<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreGateway")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[async_trait]
impl<F: ConnectionFactory> CourseStore for StoreGateway<F> {
    async fn exists(&self, id: CourseId) -> Result<bool, StoreError> {
        self.ensure_initialized().await?.exists(id).await
    }

    async fn insert(&self, course: &Course) -> Result<(), StoreError> {
        self.ensure_initialized().await?.insert(course).await
    }

    async fn delete(&self, id: CourseId) -> Result<u64, StoreError> {
        self.ensure_initialized().await?.delete(id).await
    }

    async fn delete_recording(&self, event: &CourseEvent) -> Result<DeleteOutcome, StoreError> {
        self.ensure_initialized().await?.delete_recording(event).await
    }
}
