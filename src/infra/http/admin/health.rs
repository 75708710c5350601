use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::error::ErrorReport;

use super::AdminState;

const SOURCE: &str = "infra::http::admin::health";

/// 204 while the cache store answers version reads, 503 otherwise.
pub(super) async fn admin_health(State(state): State<AdminState>) -> Response {
    let namespace = state.cache.namespace().to_string();
    match state.cache.versions().get_version(&namespace).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(SOURCE, StatusCode::SERVICE_UNAVAILABLE, &err)
                .attach(&mut response);
            response
        }
    }
}
