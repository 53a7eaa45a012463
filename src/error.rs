//! Central error type and its mapping onto the JSON envelope.
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("A user with this email or username already exists")]
    DuplicateUser,

    #[error("A category with this name already exists")]
    DuplicateCategory,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Session is no longer valid, please sign in again")]
    SessionInvalidated,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Email address is not verified")]
    NotVerified,

    #[error("Email address is already verified")]
    AlreadyVerified,

    #[error("Invalid or expired code")]
    InvalidOrExpired,

    #[error("Internal server error")]
    Unexpected(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateUser | AppError::DuplicateCategory => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials
            | AppError::IncorrectPassword
            | AppError::Unauthenticated
            | AppError::SessionInvalidated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::NotVerified => StatusCode::FORBIDDEN,
            AppError::InvalidOrExpired | AppError::AlreadyVerified => StatusCode::BAD_REQUEST,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Unexpected(anyhow::Error::new(e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
        });

        if let AppError::Unexpected(inner) = &self {
            error!(error = ?inner, "unexpected error");
            // Error chains are only exposed in debug builds
            if cfg!(debug_assertions) {
                body["error"] = json!(format!("{:?}", inner));
            }
        }

        (status, Json(body)).into_response()
    }
}

/// True when the database rejected a write because of a unique index.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Name of the foreign key constraint that rejected a write, if any.
pub fn violated_foreign_key(e: &sqlx::Error) -> Option<&str> {
    match e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => db.constraint(),
        _ => None,
    }
}
