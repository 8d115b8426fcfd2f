use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ErrorEnvelope;

/// Stable error codes, `E{area}{sequence}`.
///
/// - E0xxx: transport and infrastructure
/// - E1xxx: staff authentication
/// - E2xxx: report lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InternalError,
    ValidationError,
    Unauthorized,
    Forbidden,
    RateLimited,
    BadRequest,
    PayloadTooLarge,

    TokenExpired,
    TokenInvalid,

    ReportNotFound,
    InvalidTransition,
    ReportTerminal,
    IssuerExhausted,
    DuplicateReport,
    AttachmentNotFound,
}

impl ErrorCode {
    // E0003 and E0007 are retired and must not be reused.
    fn describe(&self) -> (&'static str, StatusCode) {
        use StatusCode as S;
        match self {
            Self::InternalError => ("E0001", S::INTERNAL_SERVER_ERROR),
            Self::ValidationError => ("E0002", S::BAD_REQUEST),
            Self::Unauthorized => ("E0004", S::UNAUTHORIZED),
            Self::Forbidden => ("E0005", S::FORBIDDEN),
            Self::RateLimited => ("E0006", S::TOO_MANY_REQUESTS),
            Self::BadRequest => ("E0008", S::BAD_REQUEST),
            Self::PayloadTooLarge => ("E0009", S::PAYLOAD_TOO_LARGE),

            Self::TokenExpired => ("E1001", S::UNAUTHORIZED),
            Self::TokenInvalid => ("E1002", S::UNAUTHORIZED),

            Self::ReportNotFound => ("E2001", S::NOT_FOUND),
            Self::InvalidTransition => ("E2002", S::CONFLICT),
            Self::ReportTerminal => ("E2003", S::CONFLICT),
            // retrying draws fresh ids, so this is transient
            Self::IssuerExhausted => ("E2004", S::SERVICE_UNAVAILABLE),
            Self::DuplicateReport => ("E2005", S::CONFLICT),
            Self::AttachmentNotFound => ("E2006", S::NOT_FOUND),
        }
    }

    pub fn code(&self) -> &'static str {
        self.describe().0
    }

    pub fn status_code(&self) -> StatusCode {
        self.describe().1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known { code, message: message.into(), details: None }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known { code, message: message.into(), details: Some(details) }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Validation(_) => ErrorCode::ValidationError,
        }
    }
}

/// `{ "field": ["message", ...] }`, falling back to the rule code when a
/// rule carries no message.
pub fn field_errors(errors: &validator::ValidationErrors) -> serde_json::Value {
    let fields: serde_json::Map<String, serde_json::Value> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(m) => m.to_string(),
                    None => e.code.to_string(),
                })
                .collect::<Vec<_>>();
            (field.to_string(), serde_json::json!(messages))
        })
        .collect();
    serde_json::Value::Object(fields)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let envelope = match self {
            AppError::Known { message, details, .. } => {
                if code.status_code().is_server_error() {
                    tracing::error!(code = code.code(), "{message}");
                }
                ErrorEnvelope::new(code.code(), message).with_details(details)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                ErrorEnvelope::new(code.code(), "internal server error")
            }
            AppError::Validation(errs) => ErrorEnvelope::new(code.code(), "validation failed")
                .with_details(Some(serde_json::json!({ "fields": field_errors(&errs) }))),
        };

        (code.status_code(), Json(envelope)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// A body over the configured limit becomes `PayloadTooLarge`; any other
/// unreadable JSON body is a `BadRequest` carrying axum's reason.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::new(ErrorCode::PayloadTooLarge, "request body is too large")
        } else {
            AppError::new(ErrorCode::BadRequest, rejection.body_text())
        }
    }
}

/// `axum::Json` with its rejections rendered in the error envelope.
#[derive(Debug, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
