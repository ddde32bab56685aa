use axum::{
    routing::get,
    Extension, Router,
};
use std::sync::Arc;

use crate::controllers;
use crate::{health_with_pool, AppState};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|Extension(state): Extension<Arc<AppState>>| async move {
            health_with_pool(state.store.pool()).await
        }))
        .route("/ws", get(controllers::ws_handler))
        .route("/api/messages", get(controllers::list_messages))
        .route("/api/conversations", get(controllers::list_conversations))
        .layer(Extension(state))
}
