mod cache;
mod health;
mod pages;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_health", get(health::admin_health))
        .route("/_cache/invalidate", post(cache::invalidate_cache))
        .route(
            "/_pages/{id}/{language}/publish",
            post(pages::publish_page),
        )
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
