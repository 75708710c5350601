use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri,
        header::{ACCEPT_LANGUAGE, HOST},
    },
    middleware,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::application::{
    error::HttpError,
    languages::parse_accept_language,
    pipeline::{PageRequest, PageResponse, RequestPipeline},
};

use super::middleware::{log_responses, set_request_context};

const SOURCE: &str = "infra::http::public";

/// Set by the upstream auth layer for editors; enables drafts and hidden languages.
pub const HEADER_PRIVILEGED: &str = "x-trellis-privileged";
/// Authenticated user name set by the upstream auth layer.
pub const HEADER_USER: &str = "x-trellis-user";
const HEADER_FORWARDED_PROTO: &str = "x-forwarded-proto";

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<RequestPipeline>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .fallback(serve_page)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn serve_page(
    State(state): State<HttpState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let host = header_str(&headers, HOST);
    let Some(site) = state.pipeline.sites().by_host(host) else {
        return HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Site not found",
            format!("no site configured for host {host:?}"),
        )
        .into_response();
    };

    let path = uri
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut page_request = PageRequest::get(site.id, path)
        .with_method(method.clone())
        .with_accepted_languages(
            header_str(&headers, ACCEPT_LANGUAGE)
                .map(parse_accept_language)
                .unwrap_or_default(),
        );
    if let Some(host) = host {
        page_request = page_request.with_host(host);
    }
    page_request.secure = header_str(&headers, HeaderName::from_static(HEADER_FORWARDED_PROTO))
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
    if let Some(user) = header_str(&headers, HeaderName::from_static(HEADER_USER))
        .map(str::trim)
        .filter(|user| !user.is_empty())
    {
        page_request = page_request.authenticated(user);
    }
    if header_str(&headers, HeaderName::from_static(HEADER_PRIVILEGED))
        .is_some_and(is_truthy)
    {
        page_request = page_request.privileged();
    }

    let response = state.pipeline.serve(&page_request).await;
    into_http_response(response, method == Method::HEAD)
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn into_http_response(page: PageResponse, is_head: bool) -> Response {
    let PageResponse {
        status,
        headers,
        body,
        report,
    } = page;

    let body = if is_head { Body::empty() } else { Body::from(body) };
    let mut response = (status, body).into_response();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!(
                target = SOURCE,
                header = %name,
                "dropping header that is not valid HTTP"
            ),
        }
    }
    if let Some(report) = report {
        report.attach(&mut response);
    }
    response
}
