use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::store::StoreError;

/// One violated field rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every failure a handler or gate can raise. Converted to the wire format
/// in exactly one place: the `IntoResponse` impl below.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid input data. {}", join_violations(.0))]
    Validation(Vec<FieldError>),
    #[error("Invalid {field}: {value}.")]
    InvalidReference { field: String, value: String },
    #[error("Duplicate field value: {value}. Please use another value!")]
    Duplicate { field: String, value: String },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Too many requests, please try again later.")]
    TooManyRequests,
    #[error("Request timed out")]
    Timeout,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn join_violations(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(". ")
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::Validation(_)
            | ApiError::InvalidReference { .. }
            | ApiError::Duplicate { .. }
            | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            "Something went wrong".to_string()
        } else {
            message
        }
    }

    /// Diagnostic chain, only ever sent outside production.
    pub fn trace(&self) -> String {
        match self {
            ApiError::Internal(err) => format!("{err:?}"),
            other => format!("{other:?}"),
        }
    }

    pub fn into_body(self) -> (StatusCode, ErrorBody, String) {
        let status = self.status();
        let trace = self.trace();
        let message = self.message();
        let errors = match self {
            ApiError::Validation(errors) => errors,
            ApiError::Duplicate { field, .. } => vec![FieldError {
                field,
                message: message.clone(),
            }],
            _ => Vec::new(),
        };
        let body = ErrorBody {
            success: false,
            status_code: status.as_u16(),
            message,
            errors,
            stack: None,
        };
        (status, body, trace)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Attached to every error response so the diagnostics layer can re-render
/// the body with its trace.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub body: ErrorBody,
    pub trace: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, trace) = self.into_body();
        if status.is_server_error() {
            error!(status = %status, error = %trace, "request failed");
        } else {
            warn!(status = %status, message = %body.message, "request rejected");
        }
        let mut res = (status, Json(body.clone())).into_response();
        res.extensions_mut().insert(ErrorReport { body, trace });
        res
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field, value } => ApiError::Duplicate { field, value },
            StoreError::Database(e) => ApiError::Internal(anyhow::Error::new(e).context("database error")),
            StoreError::Corrupt(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        use axum::extract::path::ErrorKind;

        if let PathRejection::FailedToDeserializePathParams(inner) = &rejection {
            match inner.kind() {
                ErrorKind::ParseErrorAtKey { key, value, .. } => {
                    return ApiError::InvalidReference {
                        field: key.clone(),
                        value: value.clone(),
                    };
                }
                ErrorKind::ParseError { value, .. } | ErrorKind::ParseErrorAtIndex { value, .. } => {
                    return ApiError::InvalidReference {
                        field: "id".into(),
                        value: value.clone(),
                    };
                }
                _ => {}
            }
        }
        ApiError::BadRequest(rejection.body_text())
    }
}
