//! Course domain events and the publishing seam to the message bus.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventPublisher, PublishError, Subscription};
pub use event::{CourseEvent, Operation};
pub use in_memory_bus::InMemoryEventBus;
