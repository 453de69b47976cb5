use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use instructor_core::{Course, CourseId};
use instructor_events::CourseEvent;

use super::{ConnectionFactory, CourseStore, DeleteOutcome, StoreError};
use crate::outbox::{OutboxRecord, OutboxStore};

#[derive(Debug, Clone)]
struct OutboxEntry {
    record: OutboxRecord,
    published: bool,
    dead_lettered: bool,
}

#[derive(Debug, Default)]
struct Tables {
    courses: BTreeMap<CourseId, Course>,
    outbox: Vec<OutboxEntry>,
}

/// In-memory course table + outbox.
///
/// Intended for tests/dev. One write lock covers the delete and the outbox
/// append, which gives the same atomicity as the Postgres transaction.
#[derive(Debug, Default)]
pub struct InMemoryCourseStore {
    tables: RwLock<Tables>,
}

impl InMemoryCourseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current course rows, ordered by id.
    pub fn courses(&self) -> Vec<Course> {
        self.tables
            .read()
            .map(|t| t.courses.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every outbox row ever recorded, in insertion order.
    pub fn outbox_snapshot(&self) -> Vec<OutboxRecord> {
        self.tables
            .read()
            .map(|t| t.outbox.iter().map(|e| e.record.clone()).collect())
            .unwrap_or_default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Query("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Query("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CourseStore for InMemoryCourseStore {
    async fn exists(&self, id: CourseId) -> Result<bool, StoreError> {
        Ok(self.read()?.courses.contains_key(&id))
    }

    async fn insert(&self, course: &Course) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.courses.contains_key(&course.id) {
            return Err(StoreError::Conflict(format!("id {}", course.id)));
        }
        tables.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn delete(&self, id: CourseId) -> Result<u64, StoreError> {
        let removed = self.write()?.courses.remove(&id);
        Ok(u64::from(removed.is_some()))
    }

    async fn delete_recording(&self, event: &CourseEvent) -> Result<DeleteOutcome, StoreError> {
        let mut tables = self.write()?;

        if tables.courses.remove(&event.course_id()).is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        tables.outbox.push(OutboxEntry {
            record: OutboxRecord::new(event.clone()),
            published: false,
            dead_lettered: false,
        });

        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl OutboxStore for InMemoryCourseStore {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .outbox
            .iter()
            .filter(|e| !e.published && !e.dead_lettered)
            .take(limit)
            .map(|e| e.record.clone())
            .collect())
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if let Some(entry) = tables
            .outbox
            .iter_mut()
            .find(|e| e.record.event.event_id() == event_id)
        {
            entry.published = true;
            entry.record.attempts += 1;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if let Some(entry) = tables
            .outbox
            .iter_mut()
            .find(|e| e.record.event.event_id() == event_id)
        {
            entry.record.attempts += 1;
            entry.record.last_error = Some(error.to_string());
            entry.dead_lettered = dead_letter;
        }
        Ok(())
    }

    async fn dead_lettered(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .outbox
            .iter()
            .filter(|e| e.dead_lettered)
            .take(limit)
            .map(|e| e.record.clone())
            .collect())
    }
}

/// Hands out one shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnectionFactory {
    store: Arc<InMemoryCourseStore>,
}

impl InMemoryConnectionFactory {
    pub fn new(store: Arc<InMemoryCourseStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<InMemoryCourseStore> {
        &self.store
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryConnectionFactory {
    type Store = Arc<InMemoryCourseStore>;

    async fn connect(&self) -> Result<Self::Store, StoreError> {
        Ok(self.store.clone())
    }
}
