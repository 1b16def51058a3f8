use axum::{
    Router,
    routing::{delete, get, post},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/highlight", post(handler::create_highlight))
        .route("/highlights", get(handler::list_highlights))
        .route(
            "/highlight/:highlight_id",
            get(handler::get_highlight)
                .put(handler::ensure_image)
                .delete(handler::delete_highlight),
        )
        .route("/highlight/:highlight_id/generate", post(handler::generate_image))
        .route("/highlight/:highlight_id/image", delete(handler::delete_image))
}
