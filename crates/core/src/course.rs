//! Course record and the outcome of a store-side mutation.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::CourseId;

/// Width of the `name` column.
pub const MAX_COURSE_NAME_LEN: usize = 255;

/// Human-readable course title.
///
/// Always trimmed, never empty, never wider than the column it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseName(String);

impl CourseName {
    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("course name must not be blank"));
        }
        if trimmed.chars().count() > MAX_COURSE_NAME_LEN {
            return Err(DomainError::validation(format!(
                "course name must be at most {MAX_COURSE_NAME_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CourseName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CourseName> for String {
    fn from(value: CourseName) -> Self {
        value.0
    }
}

impl core::fmt::Display for CourseName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A course row: identity is `id`, `name` is nullable like the column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    #[serde(default)]
    pub name: Option<CourseName>,
}

impl Course {
    pub fn new(id: CourseId, name: Option<CourseName>) -> Self {
        Self { id, name }
    }

    pub fn named(id: CourseId, name: CourseName) -> Self {
        Self { id, name: Some(name) }
    }

    /// Returns the name or a validation error naming the missing field.
    pub fn require_name(&self) -> DomainResult<&CourseName> {
        self.name
            .as_ref()
            .ok_or_else(|| DomainError::validation("name is required"))
    }
}

/// Result of a store-side delete, consumed once by the command handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
}

impl OperationOutcome {
    pub const DELETED: &'static str = "Course deleted successfully";
    pub const NOT_FOUND: &'static str = "Course not found";

    pub fn deleted() -> Self {
        Self {
            success: true,
            message: Self::DELETED.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            success: false,
            message: Self::NOT_FOUND.to_string(),
        }
    }
}
