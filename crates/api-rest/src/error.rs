use api_shared::{dto::ErrorRes, AuthError};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use nwd_core::{CoreError, ErrorKind};

/// Error response of every handler: a status code and a JSON body safe to show to the caller.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

pub(crate) fn status_for(kind: ErrorKind) -> (StatusCode, &'static str) {
    match kind {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
        ErrorKind::Guard => (StatusCode::CONFLICT, "guard"),
        ErrorKind::Uniqueness => (StatusCode::CONFLICT, "uniqueness"),
        ErrorKind::WindowExpired => (StatusCode::UNPROCESSABLE_ENTITY, "window_expired"),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::Permission => (StatusCode::FORBIDDEN, "permission"),
        ErrorKind::Infrastructure => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let (status, kind) = status_for(err.kind());
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Core error: {:?}", err);
        }
        Self {
            status,
            kind,
            message: err.user_message(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_client_error() {
            let status = match err {
                AuthError::InvalidHeader { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNAUTHORIZED,
            };
            Self {
                status,
                kind: "unauthenticated",
                message: err.to_string(),
            }
        } else {
            tracing::error!("Auth configuration error: {}", err);
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "internal",
                message: "Internal error".into(),
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "validation",
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "validation",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorRes {
                kind: self.kind.into(),
                message: self.message,
            }),
        )
            .into_response()
    }
}
