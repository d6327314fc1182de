//! Mapping of service errors onto HTTP responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sv_core::Error;

/// JSON error body with the status the error maps to
pub fn error_response(err: Error) -> Response {
    let status = status_for(&err);
    match err {
        Error::Validation(errors) => (
            status,
            Json(serde_json::json!({
                "error": "Validation failed",
                "fields": errors.errors,
            })),
        )
            .into_response(),
        Error::Encryption(detail) => {
            tracing::error!("Decryption failed: {}", detail);
            message(status, "Could not decrypt file")
        }
        err if status == StatusCode::INTERNAL_SERVER_ERROR => {
            tracing::error!("Request failed: {}", err);
            message(status, "Internal server error")
        }
        err => message(status, &err.to_string()),
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
        Error::AccessDenied => StatusCode::FORBIDDEN,
        Error::SubscriptionRequired => StatusCode::PAYMENT_REQUIRED,
        Error::FileNotFound(_) | Error::UserNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Error::EmailTaken(_) => StatusCode::CONFLICT,
        Error::Unreadable => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(serde_json::json!({ "error": text }))).into_response()
}

pub fn unauthorized() -> Response {
    message(StatusCode::UNAUTHORIZED, "Authentication required")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::ValidationErrors;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&Error::SubscriptionRequired),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status_for(&Error::FileNotFound(3)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&Error::InvalidFileType),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_for(&Error::Validation(ValidationErrors::single("email", "bad"))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&Error::Encryption("hmac".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_decryption_detail_is_hidden() {
        let response = error_response(Error::Encryption("HMAC mismatch".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
