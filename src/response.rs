use axum::{
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::error::AppError;

/// `{success, message, data?}` wrapper returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;
pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: message.into(),
        data: Some(data),
    })
}

pub fn ok_message(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        message: message.into(),
        data: None,
    })
}

pub fn created<T: Serialize>(
    message: impl Into<String>,
    data: T,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(message, data))
}

/// JSON body extractor whose rejection renders through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Path` with the same rejection handling as [`AppJson`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);
