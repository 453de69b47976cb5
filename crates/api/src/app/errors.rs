use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::warn;

use instructor_core::DomainError;
use instructor_infra::CommandError;

/// Map a command failure to its HTTP response.
///
/// Store failures are reported as 400 with the backend's message, as the
/// public contract of these routes only distinguishes 200/400/404 for them.
pub fn command_error_to_response(err: CommandError) -> axum::response::Response {
    match err {
        CommandError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CommandError::Store(e) => json_error(StatusCode::BAD_REQUEST, "store_error", e.to_string()),
        e @ CommandError::Publish { .. } => {
            json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
}

/// Malformed or mistyped JSON bodies are a plain 400, never axum's 415/422.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    warn!(error = %rejection.body_text(), "rejected request body");
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use instructor_events::PublishError;
    use instructor_infra::store::StoreError;

    #[test]
    fn command_errors_map_to_contract_statuses() {
        let validation = command_error_to_response(CommandError::Validation("name is required".into()));
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let store = command_error_to_response(CommandError::Store(StoreError::Query("boom".into())));
        assert_eq!(store.status(), StatusCode::BAD_REQUEST);

        let publish = command_error_to_response(CommandError::Publish {
            event_id: uuid::Uuid::now_v7(),
            source: PublishError::transport("bus down"),
        });
        assert_eq!(publish.status(), StatusCode::BAD_GATEWAY);
    }
}
