//! `instructor-core` — course domain primitives.
//!
//! This crate contains **pure domain** types (no infrastructure concerns).

pub mod course;
pub mod error;
pub mod id;

pub use course::{Course, CourseName, MAX_COURSE_NAME_LEN, OperationOutcome};
pub use error::{DomainError, DomainResult};
pub use id::CourseId;
