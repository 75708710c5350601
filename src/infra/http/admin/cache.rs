use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::error::HttpError;

use super::AdminState;

const SOURCE: &str = "infra::http::admin::cache";

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    namespace: String,
    epoch: u64,
}

pub(super) async fn invalidate_cache(State(state): State<AdminState>) -> Response {
    match state.publish.invalidate().await {
        Some(epoch) => Json(InvalidateResponse {
            namespace: state.cache.namespace().to_string(),
            epoch,
        })
        .into_response(),
        None => HttpError::new(
            SOURCE,
            StatusCode::SERVICE_UNAVAILABLE,
            "Cache unavailable",
            "the version store rejected the epoch bump",
        )
        .into_response(),
    }
}
