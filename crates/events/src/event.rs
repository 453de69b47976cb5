use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use instructor_core::{Course, CourseId, DomainError, DomainResult};

/// Kind of mutation a [`CourseEvent`] announces.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Delete,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Delete => "delete",
            Operation::Update => "update",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Operation::Add),
            "delete" => Ok(Operation::Delete),
            "update" => Ok(Operation::Update),
            other => Err(DomainError::validation(format!("unknown operation '{other}'"))),
        }
    }
}

/// Envelope announcing one accepted course mutation.
///
/// Events are facts: built once per request, never mutated afterwards, and
/// handed to the publisher (or the outbox) by value.
///
/// `event_id` is a UUIDv7 and is the deduplication key for consumers, since
/// delivery from the outbox is at-least-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEvent {
    event_id: Uuid,
    operation: Operation,
    payload: Course,
    occurred_at: DateTime<Utc>,
}

impl CourseEvent {
    /// Build a fresh event for `operation`.
    ///
    /// `add` and `update` carry the full record, so a name is required.
    /// `delete` only needs the id.
    pub fn new(operation: Operation, payload: Course) -> DomainResult<Self> {
        match operation {
            Operation::Add | Operation::Update => {
                payload.require_name()?;
            }
            Operation::Delete => {}
        }

        Ok(Self {
            event_id: Uuid::now_v7(),
            operation,
            payload,
            occurred_at: Utc::now(),
        })
    }

    /// Rebuild an event that was already accepted (e.g. read back from the outbox).
    pub fn from_parts(
        event_id: Uuid,
        operation: Operation,
        payload: Course,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            operation,
            payload,
            occurred_at,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn course_id(&self) -> CourseId {
        self.payload.id
    }

    pub fn payload(&self) -> &Course {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Stable event name (e.g. "course.deleted").
    pub fn event_type(&self) -> &'static str {
        match self.operation {
            Operation::Add => "course.added",
            Operation::Delete => "course.deleted",
            Operation::Update => "course.updated",
        }
    }

    pub fn into_payload(self) -> Course {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instructor_core::CourseName;

    fn algebra() -> Course {
        Course::named(CourseId::new(1).unwrap(), CourseName::new("Algebra").unwrap())
    }

    #[test]
    fn add_requires_a_name() {
        let bare = Course::new(CourseId::new(1).unwrap(), None);
        assert!(matches!(
            CourseEvent::new(Operation::Add, bare.clone()),
            Err(DomainError::Validation(_))
        ));
        assert!(CourseEvent::new(Operation::Update, bare.clone()).is_err());
        assert!(CourseEvent::new(Operation::Delete, bare).is_ok());
    }

    #[test]
    fn each_event_gets_its_own_id() {
        let a = CourseEvent::new(Operation::Add, algebra()).unwrap();
        let b = CourseEvent::new(Operation::Add, algebra()).unwrap();
        assert_ne!(a.event_id(), b.event_id());
        assert_eq!(a.payload(), b.payload());
    }

    #[test]
    fn wire_format_uses_lowercase_operation() {
        let ev = CourseEvent::new(Operation::Delete, algebra()).unwrap();
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["operation"], "delete");
        assert_eq!(json["payload"]["id"], 1);
        assert_eq!(json["payload"]["name"], "Algebra");
        assert_eq!(json["event_id"], ev.event_id().to_string());

        let back: CourseEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
        assert_eq!(back.event_type(), "course.deleted");
    }

    #[test]
    fn operation_parses_its_own_rendering() {
        for op in [Operation::Add, Operation::Delete, Operation::Update] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("remove".parse::<Operation>().is_err());
    }
}
