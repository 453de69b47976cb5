//! Infrastructure layer: store gateway, outbox relay, bus adapters, config.

pub mod command_handler;
pub mod config;
pub mod event_bus;
pub mod outbox;
pub mod retry;
pub mod store;

pub use command_handler::{CommandError, CourseCommandHandler, RetractOutcome, SubmitOutcome};
pub use config::{AppConfig, ConfigError};
