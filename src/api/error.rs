//! Domain error taxonomy, translated into transport status codes exactly once.
//!
//! Handlers return `Result<_, Error>`; nothing downstream builds HTTP
//! responses out of raw status codes. `Unexpected` is logged server-side and
//! surfaced as a generic message so internals never leak to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum Error {
    /// Missing or malformed credential.
    Unauthenticated,
    /// The credential is valid but expired; the client should refresh.
    Expired,
    /// Role or ownership denial; the message names the missing permission.
    Forbidden(String),
    NotFound(String),
    /// Duplicate registration.
    Conflict(String),
    /// Malformed payload or business-rule failure.
    Validation(String),
    /// Catch-all; logged with its chain, generic message to the client.
    Unexpected(anyhow::Error),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::Expired => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Unauthenticated => "Not authenticated".to_string(),
            Self::Expired => "Token expired, refresh your session".to_string(),
            Self::Forbidden(detail)
            | Self::NotFound(detail)
            | Self::Conflict(detail)
            | Self::Validation(detail) => detail.clone(),
            Self::Unexpected(_) => "Something went wrong".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Self::Unexpected(err) = &self {
            error!("Unhandled error: {err:?}");
        }

        (self.status(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Unexpected(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Forbidden("no".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::NotFound("gone".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Conflict("dup".to_string()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Validation("bad".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Unexpected(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unexpected_hides_detail() {
        let err = Error::Unexpected(anyhow!("connection reset by postgrest"));
        assert_eq!(err.detail(), "Something went wrong");
    }

    #[test]
    fn test_forbidden_names_permission() {
        let err = Error::Forbidden("You cannot edit users with role 'admin'".to_string());
        assert_eq!(err.detail(), "You cannot edit users with role 'admin'");
    }
}
