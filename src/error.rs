//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::db::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("access denied: token missing")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("only JPEG and PNG files are allowed")]
    UnsupportedMedia { file: String, mime: String },

    #[error("file exceeds the size limit")]
    PayloadTooLarge { file: String, limit: u64 },

    #[error("too many files")]
    TooManyFiles { limit: usize },

    #[error("unexpected file field")]
    UnexpectedField(String),

    #[error("no file was uploaded")]
    EmptyUpload,

    #[error("malformed multipart body")]
    Multipart(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::ExpiredToken => "expired_token",
            Self::UnsupportedMedia { .. } => "unsupported_media",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::TooManyFiles { .. } => "too_many_files",
            Self::UnexpectedField(_) => "unexpected_field",
            Self::EmptyUpload => "empty_upload",
            Self::Multipart(_) => "multipart_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) | Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidToken | Self::ExpiredToken => StatusCode::FORBIDDEN,
            Self::UnsupportedMedia { .. }
            | Self::PayloadTooLarge { .. }
            | Self::TooManyFiles { .. }
            | Self::UnexpectedField(_)
            | Self::EmptyUpload
            | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Extra context naming the offending entry, when there is one.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::UnsupportedMedia { file, mime } => Some(format!("{file} has type {mime}")),
            Self::PayloadTooLarge { file, limit } => {
                Some(format!("{file} is larger than {limit} bytes"))
            }
            Self::TooManyFiles { limit } => Some(format!("at most {limit} files per upload")),
            Self::UnexpectedField(field) => Some(format!("files must be sent in field '{field}'")),
            Self::Multipart(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(name) => Self::Conflict(format!("username '{name}' already exists")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(reason) = &self {
            tracing::error!("Internal error: {}", reason);
            return (status, Json(json!({ "error": reason }))).into_response();
        }
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_split_between_401_and_403() {
        assert_eq!(AppError::MissingToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Unauthorized("bad password".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::InvalidToken.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::ExpiredToken.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_upload_rejections_are_bad_request() {
        let errors = [
            AppError::UnsupportedMedia {
                file: "doc.pdf".into(),
                mime: "application/pdf".into(),
            },
            AppError::PayloadTooLarge {
                file: "big.png".into(),
                limit: 10,
            },
            AppError::TooManyFiles { limit: 10 },
            AppError::EmptyUpload,
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{}", err.code());
        }
    }

    #[test]
    fn test_detail_names_failing_file() {
        let err = AppError::UnsupportedMedia {
            file: "doc.pdf".into(),
            mime: "application/pdf".into(),
        };
        assert_eq!(err.detail().as_deref(), Some("doc.pdf has type application/pdf"));
        assert!(AppError::EmptyUpload.detail().is_none());
    }

    #[test]
    fn test_duplicate_store_error_becomes_conflict() {
        let err: AppError = StoreError::Duplicate("ana".into()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
