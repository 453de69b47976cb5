//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, bus, outbox relay and command handler wiring
//! - `routes/`: HTTP handlers
//! - `dto.rs`: request bodies and their mapping to domain types
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around already-initialized services.
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::courses::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
