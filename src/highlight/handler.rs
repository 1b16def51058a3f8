use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::api::{bad_request, message, success};
use crate::auth::Owner;
use crate::handler::AppState;
use crate::model::{ImageOutcome, NewHighlight};

#[derive(Debug, Deserialize)]
pub struct CreateHighlightRequest {
    pub text: String,
    pub location: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateParams {
    #[serde(default)]
    pub image: bool,
}

/// Override text for the image prompt, sent either as a bare JSON string or
/// as `{"new_text": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EnsureImageRequest {
    Text(String),
    Fields { new_text: Option<String> },
}

impl EnsureImageRequest {
    fn into_new_text(self) -> Option<String> {
        match self {
            EnsureImageRequest::Text(text) => Some(text),
            EnsureImageRequest::Fields { new_text } => new_text,
        }
    }
}

/// An empty body or `null` means no override.
fn parse_new_text(body: &[u8]) -> Result<Option<String>, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let request: Option<EnsureImageRequest> = serde_json::from_slice(body)?;
    Ok(request.and_then(EnsureImageRequest::into_new_text))
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: ImageOutcome,
}

pub async fn create_highlight(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(book_id): Path<String>,
    Query(params): Query<CreateParams>,
    Json(payload): Json<CreateHighlightRequest>,
) -> Response {
    let input = NewHighlight {
        text: payload.text,
        location: payload.location,
        book_id,
        owner_id,
    };

    match state.lifecycle.create_highlight(input, params.image).await {
        Ok(highlight) => success(highlight),
        Err(e) => e.into_response(),
    }
}

pub async fn list_highlights(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(book_id): Path<String>,
) -> Response {
    match state.lifecycle.list_highlights(&owner_id, &book_id).await {
        Ok(highlights) if highlights.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(highlights) => success(highlights),
        Err(e) => e.into_response(),
    }
}

pub async fn get_highlight(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path((book_id, highlight_id)): Path<(String, String)>,
) -> Response {
    match state.lifecycle.get_highlight(&owner_id, &book_id, &highlight_id).await {
        Ok(highlight) => success(highlight),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_highlight(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path((book_id, highlight_id)): Path<(String, String)>,
) -> Response {
    match state.lifecycle.delete_highlight(&owner_id, &book_id, &highlight_id).await {
        Ok(()) => message("Successfully deleted highlight!"),
        Err(e) => e.into_response(),
    }
}

pub async fn ensure_image(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path((book_id, highlight_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let new_text = match parse_new_text(&body) {
        Ok(new_text) => new_text,
        Err(e) => return bad_request(&format!("invalid request body: {}", e)),
    };

    match state
        .lifecycle
        .ensure_image(&owner_id, &book_id, &highlight_id, new_text.as_deref())
        .await
    {
        Ok(outcome) => success(ImageResponse {
            message: outcome.message(),
            outcome,
        }),
        Err(e) => e.into_response(),
    }
}

pub async fn generate_image(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path((book_id, highlight_id)): Path<(String, String)>,
) -> Response {
    match state.lifecycle.force_generate(&owner_id, &book_id, &highlight_id).await {
        Ok(outcome) => success(ImageResponse {
            message: "Image successfully generated.",
            outcome,
        }),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_image(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path((book_id, highlight_id)): Path<(String, String)>,
) -> Response {
    match state.lifecycle.delete_image(&owner_id, &book_id, &highlight_id).await {
        Ok(()) => message("Successfully removed image from highlight"),
        Err(e) => e.into_response(),
    }
}
