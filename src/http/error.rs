use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::domain::order::AddressIssue;
use crate::service::ServiceError;

// ============================================================================
// HTTP error mapping
// ============================================================================
//
// Every failure leaves the API as `{"message": ...}`, with an `errors` array
// attached when individual fields were rejected. Collaborator failures keep
// the upstream status so the caller sees the same code the collaborator
// returned.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    issues: Vec<AddressIssue>,
    source: Option<anyhow::Error>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<&'a AddressIssue>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            issues: Vec::new(),
            source: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(source: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal Server Error".to_string(),
            issues: Vec::new(),
            source: Some(source),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation { message, issues } => Self {
                status: StatusCode::BAD_REQUEST,
                message,
                issues,
                source: None,
            },
            ServiceError::Forbidden(message) => Self::new(StatusCode::FORBIDDEN, message),
            ServiceError::NotFound(message) => Self::new(StatusCode::NOT_FOUND, message),
            ServiceError::Conflict(message) => Self::new(StatusCode::CONFLICT, message),
            ServiceError::Upstream { status, message } => Self::new(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message,
            ),
            ServiceError::Internal(source) => Self::internal(source),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        if self.status.is_server_error() {
            tracing::error!(
                status = self.status.as_u16(),
                error = ?self.source,
                message = %self.message,
                "Request failed"
            );
        }

        HttpResponse::build(self.status).json(ErrorBody {
            message: &self.message,
            errors: self.issues.iter().collect(),
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
