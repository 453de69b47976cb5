//! Redis Streams publisher for course events.
//!
//! Every event becomes one stream entry (XADD, auto-generated id):
//!
//! | field | value |
//! |-------|-------|
//! | `event_id` | UUIDv7 of the event (dedup key) |
//! | `operation` | `add`, `update` or `delete` |
//! | `course_id` | primary key of the course |
//! | `payload` | JSON-encoded `CourseEvent` |
//!
//! Consumers read with XREADGROUP on their own group. The publisher never
//! creates groups.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use instructor_events::{CourseEvent, EventPublisher, PublishError};

use crate::config::DEFAULT_STREAM_KEY;

#[derive(Debug, Clone)]
pub struct RedisStreamsPublisher {
    client: Arc<redis::Client>,
    stream_key: String,
}

impl RedisStreamsPublisher {
    /// Create a publisher for `redis_url`.
    ///
    /// Only the URL is checked here; the connection is made per publish.
    pub fn new(
        redis_url: impl AsRef<str>,
        stream_key: Option<String>,
    ) -> Result<Self, PublishError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| PublishError::transport(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            stream_key: stream_key.unwrap_or_else(|| DEFAULT_STREAM_KEY.to_string()),
        })
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }
}

/// Field/value pairs written for one event.
fn stream_fields(event: &CourseEvent) -> Result<[(&'static str, String); 4], PublishError> {
    let payload =
        serde_json::to_string(event).map_err(|e| PublishError::Serialize(e.to_string()))?;

    Ok([
        ("event_id", event.event_id().to_string()),
        ("operation", event.operation().to_string()),
        ("course_id", event.course_id().to_string()),
        ("payload", payload),
    ])
}

#[async_trait]
impl EventPublisher for RedisStreamsPublisher {
    #[instrument(
        skip(self, event),
        fields(
            stream_key = %self.stream_key,
            event_id = %event.event_id(),
            operation = %event.operation()
        ),
        err
    )]
    async fn publish(&self, event: CourseEvent) -> Result<(), PublishError> {
        let fields = stream_fields(&event)?;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PublishError::transport(format!("redis connection failed: {e}")))?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_key).arg("*");
        for (field, value) in &fields {
            cmd.arg(*field).arg(value);
        }

        let _entry_id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| PublishError::transport(format!("XADD failed: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instructor_core::{Course, CourseId, CourseName};
    use instructor_events::Operation;

    #[test]
    fn fields_carry_routing_keys_and_full_payload() {
        let course = Course::named(CourseId::new(12).unwrap(), CourseName::new("Algebra").unwrap());
        let event = CourseEvent::new(Operation::Delete, course).unwrap();

        let fields = stream_fields(&event).unwrap();
        assert_eq!(fields[0], ("event_id", event.event_id().to_string()));
        assert_eq!(fields[1], ("operation", "delete".to_string()));
        assert_eq!(fields[2], ("course_id", "12".to_string()));

        let decoded: CourseEvent = serde_json::from_str(&fields[3].1).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn default_stream_key_is_used_when_none_given() {
        let publisher = RedisStreamsPublisher::new("redis://127.0.0.1:6379", None).unwrap();
        assert_eq!(publisher.stream_key(), DEFAULT_STREAM_KEY);

        let custom =
            RedisStreamsPublisher::new("redis://127.0.0.1:6379", Some("courses".into())).unwrap();
        assert_eq!(custom.stream_key(), "courses");
    }

    #[test]
    fn malformed_url_is_rejected_up_front() {
        let err = RedisStreamsPublisher::new("not-a-url", None).unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)));
    }
}
