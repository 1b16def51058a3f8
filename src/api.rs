use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{ErrorKind, LifecycleError};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

pub fn message(msg: &str) -> Response {
    success(MessageResponse {
        message: msg.to_string(),
    })
}

pub fn error_response(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

pub fn not_found(msg: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, msg)
}

pub fn bad_request(msg: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, msg)
}

pub fn internal_error(msg: &str) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, msg)
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        match self.kind() {
            ErrorKind::NotFound => not_found(&self.to_string()),
            ErrorKind::PreconditionFailed => bad_request(&self.to_string()),
            ErrorKind::RateLimited => error_response(StatusCode::TOO_MANY_REQUESTS, &self.to_string()),
            ErrorKind::UpstreamFailure => {
                tracing::error!(error = %self, "upstream failure");
                internal_error("upstream service failed")
            }
        }
    }
}
