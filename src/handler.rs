use std::sync::Arc;

use axum::{Json, response::IntoResponse};
use tracing::info;

use crate::api::MessageResponse;
use crate::auth::IdentityProvider;
use crate::lifecycle::HighlightLifecycle;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<HighlightLifecycle>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(MessageResponse {
        message: "ok".to_string(),
    })
}
