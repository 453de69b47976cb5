use serde::{Deserialize, Serialize};
use uuid::Uuid;

use instructor_core::{Course, CourseId, CourseName, DomainResult};

// -------------------------
// Request DTOs
// -------------------------

/// Body of every course command: `{ "id": 1, "name": "Algebra" }`.
///
/// `name` may be omitted on delete; when present it must be a valid name.
#[derive(Debug, Deserialize)]
pub struct CourseRequest {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

impl CourseRequest {
    pub fn into_course(self) -> DomainResult<Course> {
        let id = CourseId::try_from(self.id)?;
        let name = self.name.map(CourseName::new).transpose()?;
        Ok(Course::new(id, name))
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    pub message: String,
    pub event_id: Uuid,
}

pub const MESSAGE_SENT: &str = "message sent";

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: serde_json::Value) -> CourseRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn full_body_maps_to_a_named_course() {
        let course = request(serde_json::json!({ "id": 1, "name": " Algebra " }))
            .into_course()
            .unwrap();
        assert_eq!(course.id.get(), 1);
        assert_eq!(course.name.unwrap().as_str(), "Algebra");
    }

    #[test]
    fn name_is_optional_at_this_layer() {
        let course = request(serde_json::json!({ "id": 4 })).into_course().unwrap();
        assert!(course.name.is_none());
    }

    #[test]
    fn bad_ids_and_blank_names_are_rejected() {
        assert!(request(serde_json::json!({ "id": 0, "name": "x" })).into_course().is_err());
        assert!(request(serde_json::json!({ "id": 5_000_000_000i64 })).into_course().is_err());
        assert!(request(serde_json::json!({ "id": 2, "name": "  " })).into_course().is_err());
    }
}
