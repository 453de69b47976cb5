//! Course command routes.
//!
//! | route | outcome |
//! |-------|---------|
//! | `POST /add-course` | 200 `message sent`, 400, 502 |
//! | `PUT /update-course` | 200 `message sent`, 400, 502 |
//! | `DELETE /delete-course` | 200 `Course deleted successfully`, 404 `Course not found`, 400 |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post, put},
};

use instructor_events::Operation;
use instructor_infra::RetractOutcome;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/add-course", post(add_course))
        .route("/update-course", put(update_course))
        .route("/delete-course", delete(delete_course))
}

pub async fn add_course(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CourseRequest>, JsonRejection>,
) -> axum::response::Response {
    send_course(&services, Operation::Add, body).await
}

pub async fn update_course(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CourseRequest>, JsonRejection>,
) -> axum::response::Response {
    send_course(&services, Operation::Update, body).await
}

async fn send_course(
    services: &AppServices,
    operation: Operation,
    body: Result<Json<dto::CourseRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let course = match body.into_course() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.handler.submit(operation, course).await {
        Ok(sent) => (
            StatusCode::OK,
            Json(dto::CommandAccepted {
                message: dto::MESSAGE_SENT.to_string(),
                event_id: sent.event_id,
            }),
        )
            .into_response(),
        Err(e) => errors::command_error_to_response(e),
    }
}

pub async fn delete_course(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CourseRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let course = match body.into_course() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let retracted = match services.handler.retract(course).await {
        Ok(r) => r,
        Err(e) => return errors::command_error_to_response(e),
    };

    let outcome = retracted.outcome();
    match retracted {
        RetractOutcome::Deleted { event_id } => (
            StatusCode::OK,
            Json(dto::CommandAccepted {
                message: outcome.message,
                event_id,
            }),
        )
            .into_response(),
        RetractOutcome::NotFound => {
            errors::json_error(StatusCode::NOT_FOUND, "not_found", outcome.message)
        }
    }
}
