//! Postgres-backed course store and outbox.
//!
//! ## Schema
//!
//! - `courses (id INTEGER NOT NULL PRIMARY KEY, name VARCHAR(255))`
//! - `course_outbox` holding one row per accepted delete event
//!
//! Both tables are created with `IF NOT EXISTS` when the store is opened, so
//! opening against an existing database is a no-op.
//!
//! ## Atomic delete
//!
//! `delete_recording` runs `DELETE ... WHERE id = $1` and the outbox insert
//! in one transaction. Postgres row locking makes the delete itself the
//! existence check: of two concurrent deletes for the same id, exactly one
//! sees a row affected.
//!
//! ## Thread Safety
//!
//! `PgCourseStore` is `Send + Sync` and cheap to clone; all access goes
//! through the SQLx connection pool.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{ConnectOptions, PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use instructor_core::{Course, CourseId};
use instructor_events::{CourseEvent, Operation};

use super::{ConnectionFactory, CourseStore, DeleteOutcome, StoreError};
use crate::config::DatabaseConfig;
use crate::outbox::{OutboxRecord, OutboxStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS courses (
        id INTEGER NOT NULL PRIMARY KEY,
        name VARCHAR(255)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS course_outbox (
        event_id UUID PRIMARY KEY,
        operation TEXT NOT NULL,
        course_id INTEGER NOT NULL,
        payload JSONB NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        published_at TIMESTAMPTZ,
        dead_lettered BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS course_outbox_pending_idx
        ON course_outbox (occurred_at)
        WHERE published_at IS NULL AND dead_lettered = FALSE
    "#,
];

/// Postgres course table + outbox.
#[derive(Debug, Clone)]
pub struct PgCourseStore {
    pool: Arc<PgPool>,
}

impl PgCourseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn bind_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("bind_schema", e))?;
        }
        Ok(())
    }

    async fn outbox_rows(&self, sql: &str, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(sql)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_outbox", e))?;

        rows.iter().map(outbox_record_from_row).collect()
    }
}

#[async_trait]
impl CourseStore for PgCourseStore {
    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn exists(&self, id: CourseId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM courses WHERE id = $1) AS present")
            .bind(id.get())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists", e))?;

        row.try_get::<bool, _>("present")
            .map_err(|e| map_sqlx_error("exists", e))
    }

    #[instrument(skip(self, course), fields(course_id = %course.id), err)]
    async fn insert(&self, course: &Course) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO courses (id, name) VALUES ($1, $2)")
            .bind(course.id.get())
            .bind(course.name.as_ref().map(|n| n.as_str()))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn delete(&self, id: CourseId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(
        skip(self, event),
        fields(
            course_id = %event.course_id(),
            event_id = %event.event_id(),
            rows_affected = tracing::field::Empty
        ),
        err
    )]
    async fn delete_recording(&self, event: &CourseEvent) -> Result<DeleteOutcome, StoreError> {
        let span = Span::current();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let rows = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(event.course_id().get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?
            .rows_affected();

        let outcome = DeleteOutcome::from_rows_affected(rows);
        span.record("rows_affected", rows);

        if outcome == DeleteOutcome::NotFound {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            INSERT INTO course_outbox (
                event_id,
                operation,
                course_id,
                payload,
                occurred_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.event_id())
        .bind(event.operation().as_str())
        .bind(event.course_id().get())
        .bind(Json(event.payload()))
        .bind(event.occurred_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_outbox", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(outcome)
    }
}

#[async_trait]
impl OutboxStore for PgCourseStore {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        self.outbox_rows(
            r#"
            SELECT event_id, operation, payload, occurred_at, attempts, last_error
            FROM course_outbox
            WHERE published_at IS NULL AND dead_lettered = FALSE
            ORDER BY occurred_at ASC
            LIMIT $1
            "#,
            limit,
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn mark_published(&self, event_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE course_outbox
            SET published_at = NOW(), attempts = attempts + 1, last_error = NULL
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_published", e))?;
        Ok(())
    }

    #[instrument(skip(self, error), err)]
    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        dead_letter: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE course_outbox
            SET attempts = attempts + 1, last_error = $2, dead_lettered = $3
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .bind(dead_letter)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_failed", e))?;
        Ok(())
    }

    async fn dead_lettered(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        self.outbox_rows(
            r#"
            SELECT event_id, operation, payload, occurred_at, attempts, last_error
            FROM course_outbox
            WHERE dead_lettered = TRUE
            ORDER BY occurred_at ASC
            LIMIT $1
            "#,
            limit,
        )
        .await
    }
}

fn outbox_record_from_row(row: &PgRow) -> Result<OutboxRecord, StoreError> {
    let corrupt = |e: sqlx::Error| StoreError::Corrupt(e.to_string());

    let event_id: Uuid = row.try_get("event_id").map_err(corrupt)?;
    let operation: String = row.try_get("operation").map_err(corrupt)?;
    let Json(payload): Json<Course> = row.try_get("payload").map_err(corrupt)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(corrupt)?;
    let attempts: i32 = row.try_get("attempts").map_err(corrupt)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(corrupt)?;

    let operation = Operation::from_str(&operation)
        .map_err(|e| StoreError::Corrupt(format!("event {event_id}: {e}")))?;

    Ok(OutboxRecord {
        event: CourseEvent::from_parts(event_id, operation, payload, occurred_at),
        attempts: u32::try_from(attempts).unwrap_or(0),
        last_error,
    })
}

/// Opens a pool against `POSTGRES_URL` and binds the schema.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    config: DatabaseConfig,
}

impl PgConnectionFactory {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Store = PgCourseStore;

    #[instrument(skip(self), fields(max_connections = self.config.max_connections), err)]
    async fn connect(&self) -> Result<Self::Store, StoreError> {
        // Executed statements stay out of the logs; everything else from the
        // driver is kept.
        let options = PgConnectOptions::from_str(&self.config.url)
            .map_err(|e| StoreError::Connection(format!("invalid connection string: {e}")))?
            .disable_statement_logging();

        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = PgCourseStore::new(pool);
        store.bind_schema().await?;
        Ok(store)
    }
}

/// Map a SQLx error into a `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Connection(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("timed out acquiring a connection in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("io error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {}: {}", operation, e)),
        sqlx::Error::Configuration(e) => {
            StoreError::Connection(format!("configuration error in {}: {}", operation, e))
        }
        _ => StoreError::Query(format!("sqlx error in {}: {}", operation, err)),
    }
}
