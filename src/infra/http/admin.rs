//! Operator listener: cache control and a database probe.
//!
//! Bound to its own address so it can stay off the public network.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::info;

use crate::{application::repos::HealthRepo, cache::FeedCache};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct AdminState {
    pub feed_cache: FeedCache,
    pub health: Arc<dyn HealthRepo>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_health/db", get(db_health))
        .route("/cache/clear", post(clear_cache))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn clear_cache(State(state): State<AdminState>) -> Response {
    let removed = state.feed_cache.invalidate_all().await;
    info!(
        target = "penfeed::http::admin",
        removed, "feed cache cleared by operator"
    );
    StatusCode::NO_CONTENT.into_response()
}

async fn db_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.health.health_check().await)
}
