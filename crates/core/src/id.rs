//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Primary key of a course row.
///
/// Backed by a 32-bit integer to match the `INTEGER` column. Zero and negative
/// values are rejected so an id always names a real row slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct CourseId(i32);

impl CourseId {
    pub fn new(value: i32) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::invalid_id(format!(
                "CourseId: must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for CourseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<i64> for CourseId {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let narrowed = i32::try_from(value)
            .map_err(|_| DomainError::invalid_id(format!("CourseId: {value} out of range")))?;
        Self::new(narrowed)
    }
}

impl From<CourseId> for i32 {
    fn from(value: CourseId) -> Self {
        value.0
    }
}

impl FromStr for CourseId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = i64::from_str(s.trim())
            .map_err(|e| DomainError::invalid_id(format!("CourseId: {e}")))?;
        Self::try_from(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_ids() {
        assert!(CourseId::new(0).is_err());
        assert!(CourseId::new(-4).is_err());
        assert_eq!(CourseId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn rejects_ids_wider_than_the_column() {
        assert!(CourseId::try_from(i64::from(i32::MAX) + 1).is_err());
        assert!(CourseId::try_from(i64::from(i32::MAX)).is_ok());
    }

    #[test]
    fn parses_and_serializes_as_plain_integer() {
        let id: CourseId = " 42 ".parse().unwrap();
        assert_eq!(serde_json::to_value(id).unwrap(), serde_json::json!(42));

        let back: CourseId = serde_json::from_value(serde_json::json!(42)).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_value::<CourseId>(serde_json::json!(-1)).is_err());
        assert!("abc".parse::<CourseId>().is_err());
    }
}
