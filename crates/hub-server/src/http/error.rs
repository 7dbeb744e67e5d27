//! Maps `hubcore_pipeline::PipelineError`'s eight kinds onto HTTP
//! responses, per spec §7's propagation policy: `AuthFailure`/`NotFound`
//! never leak detail (both render as a bare `401`/`404`), the rest carry
//! their message since it's meant for the Git client operating the CLI.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use hubcore_pipeline::PipelineError;

pub struct ApiError {
    status: StatusCode,
    message: String,
    www_authenticate: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            www_authenticate: false,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "authentication required".to_string(),
            www_authenticate: true,
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message).into_response();
        if self.www_authenticate {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static(r#"Basic realm="hub git""#),
            );
        }
        response
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::AuthFailure => Self::unauthorized(),
            PipelineError::PermissionDenied | PipelineError::NotFound => Self::not_found(),
            PipelineError::ProtectionViolation(msg) => Self::new(StatusCode::FORBIDDEN, msg),
            PipelineError::ValidationError(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            PipelineError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            PipelineError::Transient(msg) => {
                tracing::warn!(error = %msg, "transient error serving git request");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "temporarily unavailable, please retry")
            }
            PipelineError::Fatal(msg) => {
                tracing::error!(error = %msg, "fatal error serving git request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl From<hubcore_db::DbError> for ApiError {
    fn from(e: hubcore_db::DbError) -> Self {
        PipelineError::from(e).into()
    }
}

impl From<hubcore_git::Error> for ApiError {
    fn from(e: hubcore_git::Error) -> Self {
        PipelineError::from(e).into()
    }
}

impl From<hubcore_storage::Error> for ApiError {
    fn from(e: hubcore_storage::Error) -> Self {
        PipelineError::from(e).into()
    }
}
