use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::application::error::HttpError;
use crate::domain::entities::PageId;

use super::AdminState;

#[derive(Debug, Serialize)]
pub(super) struct PublishedPage {
    page: String,
    language: String,
    path: String,
    title: String,
}

pub(super) async fn publish_page(
    State(state): State<AdminState>,
    Path((id, language)): Path<(String, String)>,
) -> Result<Json<PublishedPage>, HttpError> {
    let page = PageId::new(id);
    let content = state.publish.publish(&page, &language).await?;
    Ok(Json(PublishedPage {
        page: content.page_id.to_string(),
        language: content.language,
        path: content.path,
        title: content.title,
    }))
}
