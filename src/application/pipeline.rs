//! Request-time page pipeline.
//!
//! One [`RequestPipeline::serve`] call runs the steps in a fixed order:
//! language prefix, language negotiation, cache read, page lookup, content
//! selection with fallbacks, redirects, permissions, rendering and finally the
//! cache write. State of a request lives in a [`RequestContext`] value.

use std::sync::Arc;
use std::time::Instant;

use axum::http::{Method, StatusCode};
use bytes::Bytes;
use metrics::histogram;
use tracing::{debug, error, info};

use crate::application::error::{ErrorReport, ServeError};
use crate::application::languages::LanguageResolver;
use crate::application::page::PageResolver;
use crate::application::redirect::{RedirectResolver, RedirectTarget, own_candidate_urls};
use crate::application::repos::{
    ContentRepo, FragmentRenderer, PageTree, RenderContext, Viewer, ViewPermissions,
};
use crate::application::site::SiteRegistry;
use crate::cache::{CacheKeyCodec, CachedPage, ResponseCache, TtlPolicy};
use crate::domain::entities::{Page, PageContent, Site, SiteId};
use crate::domain::languages::normalize_language_code;
use crate::domain::paths::{join_segments, page_url, segments};
use crate::domain::types::XFrameOptions;
use crate::presentation::views::{PageTemplate, render_error_page, render_template};
use crate::util::timezone::timezone_label;

const SOURCE: &str = "application::pipeline::RequestPipeline";

pub const HEADER_CACHE: &str = "x-cache";
pub const HEADER_PAGE_REDIRECT: &str = "x-page-redirect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub cache_enabled: bool,
    /// Page URLs carry a `/{language}/` prefix.
    pub language_prefix: bool,
    pub append_slash: bool,
    pub login_url: String,
    /// Applied to pages whose own policy is `Inherit`.
    pub default_xframe_options: XFrameOptions,
    /// Add the site timezone to cache keys.
    pub timezone_aware: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            language_prefix: true,
            append_slash: true,
            login_url: "/login/".to_string(),
            default_xframe_options: XFrameOptions::Inherit,
            timezone_aware: false,
        }
    }
}

/// Collaborators the pipeline consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub sites: Arc<SiteRegistry>,
    pub tree: Arc<dyn PageTree>,
    pub contents: Arc<dyn ContentRepo>,
    pub permissions: Arc<dyn ViewPermissions>,
    pub renderer: Arc<dyn FragmentRenderer>,
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub path: String,
    pub site_id: SiteId,
    pub host: Option<String>,
    pub secure: bool,
    pub method: Method,
    pub requested_language: Option<String>,
    pub accepted_languages: Vec<String>,
    pub is_privileged: bool,
    pub user: Option<String>,
}

impl PageRequest {
    pub fn get(site_id: SiteId, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            site_id,
            host: None,
            secure: false,
            method: Method::GET,
            requested_language: None,
            accepted_languages: Vec::new(),
            is_privileged: false,
            user: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.requested_language = Some(code.into());
        self
    }

    pub fn with_accepted_languages<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_languages = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn authenticated(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.is_privileged = true;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn viewer(&self) -> Viewer {
        Viewer {
            user: self.user.clone(),
            is_privileged: self.is_privileged,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Failure details for the logging middleware; never rendered.
    pub report: Option<ErrorReport>,
}

impl PageResponse {
    fn ok(headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status: StatusCode::OK,
            headers,
            body,
            report: None,
        }
    }

    fn redirect(location: String) -> Self {
        Self {
            status: StatusCode::FOUND,
            headers: vec![("location".to_string(), location)],
            body: Bytes::new(),
            report: None,
        }
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }
}

/// Per-request state threaded through the pipeline steps.
#[derive(Debug)]
pub struct RequestContext<'a> {
    pub request: &'a PageRequest,
    pub site: &'a Site,
    /// Request path with any language prefix removed, without slashes around it.
    pub page_path: String,
    pub preferred_language: String,
    pub cache_key: Option<String>,
}

#[derive(Clone)]
pub struct RequestPipeline {
    sites: Arc<SiteRegistry>,
    languages: LanguageResolver,
    pages: PageResolver,
    redirects: RedirectResolver,
    permissions: Arc<dyn ViewPermissions>,
    renderer: Arc<dyn FragmentRenderer>,
    ttl: TtlPolicy,
    cache: ResponseCache,
    codec: CacheKeyCodec,
    config: PipelineConfig,
}

impl RequestPipeline {
    pub fn new(
        collaborators: Collaborators,
        cache: ResponseCache,
        ttl: TtlPolicy,
        config: PipelineConfig,
    ) -> Self {
        let Collaborators {
            sites,
            tree,
            contents,
            permissions,
            renderer,
        } = collaborators;
        let languages = LanguageResolver::new(sites.clone());
        let pages = PageResolver::new(tree, contents.clone(), sites.clone());
        let redirects = RedirectResolver::new(
            languages.clone(),
            contents,
            config.language_prefix,
            config.append_slash,
        );
        Self {
            sites,
            languages,
            pages,
            redirects,
            permissions,
            renderer,
            ttl,
            cache,
            codec: CacheKeyCodec::new(config.append_slash),
            config,
        }
    }

    pub fn sites(&self) -> &SiteRegistry {
        &self.sites
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer a page request. Never fails: errors become 404/302/405/500.
    pub async fn serve(&self, request: &PageRequest) -> PageResponse {
        match self.try_serve(request).await {
            Ok(response) => response,
            Err(err) => self.error_response(request, err),
        }
    }

    async fn try_serve(&self, request: &PageRequest) -> Result<PageResponse, ServeError> {
        if request.method != Method::GET && request.method != Method::HEAD {
            return Err(ServeError::MethodNotAllowed(request.method.to_string()));
        }

        let site = self
            .sites
            .site(request.site_id)
            .ok_or_else(|| ServeError::not_found("unknown site"))?;
        let context = self.context(request, site)?;

        if let Some(key) = context.cache_key.as_deref() {
            if let Some(hit) = self.cache.get(key).await {
                return Ok(self.cached_response(hit));
            }
        }

        let page = self
            .pages
            .find_page(site.id, &context.page_path)
            .await
            .map_err(ServeError::collaborator("find_page"))?
            .ok_or_else(|| ServeError::not_found("no page matches the path"))?;

        let editing = request.is_privileged;
        let (content, served_language) = self.select_content(&context, &page, editing).await?;

        let target = RedirectTarget {
            page: &page,
            content: &content,
            preferred_language: &context.preferred_language,
            served_language: &served_language,
            follow_explicit: !request.is_privileged,
        };
        let own_urls = own_candidate_urls(request.secure, request.host.as_deref(), &request.path);
        if let Some(location) = self.redirects.compute(&target, &context.page_path, &own_urls) {
            debug!(
                site_id = %site.id,
                path = %request.path,
                location = %location,
                "redirecting page request"
            );
            return Ok(PageResponse::redirect(location));
        }
        let exposed_redirect = if request.is_privileged {
            self.redirects.explicit_target(&target)
        } else {
            None
        };

        self.check_permission(&context, &page).await?;

        self.render(&context, &page, &content, &served_language, exposed_redirect)
            .await
    }

    fn context<'a>(
        &self,
        request: &'a PageRequest,
        site: &'a Site,
    ) -> Result<RequestContext<'a>, ServeError> {
        let (page_path, prefix_language) = self.split_language_prefix(site.id, &request.path);
        let requested = request.requested_language.clone().or(prefix_language);
        let preferred_language = self
            .languages
            .resolve(
                site.id,
                requested.as_deref(),
                &request.accepted_languages,
                request.is_privileged,
            )
            .ok_or_else(|| ServeError::not_found("site offers no language"))?;

        let cache_key = self.cache_eligible(request).then(|| {
            let tz_label = if self.config.timezone_aware {
                timezone_label(site.timezone)
            } else {
                None
            };
            self.codec.encode(
                self.cache.namespace(),
                site.id,
                &request.path,
                &preferred_language,
                tz_label,
            )
        });

        Ok(RequestContext {
            request,
            site,
            page_path,
            preferred_language,
            cache_key,
        })
    }

    fn split_language_prefix(&self, site_id: SiteId, path: &str) -> (String, Option<String>) {
        let parts = segments(path);
        match parts.split_first() {
            Some((first, rest))
                if self.config.language_prefix
                    && self.languages.is_language_prefix(site_id, first) =>
            {
                (
                    join_segments(rest.iter().copied()),
                    Some(normalize_language_code(first)),
                )
            }
            _ => (join_segments(parts.iter().copied()), None),
        }
    }

    fn cache_eligible(&self, request: &PageRequest) -> bool {
        self.config.cache_enabled && !request.is_authenticated() && !request.is_privileged
    }

    /// Content in the preferred language, else in the first fallback the page
    /// is available in.
    async fn select_content(
        &self,
        context: &RequestContext<'_>,
        page: &Page,
        editing: bool,
    ) -> Result<(PageContent, String), ServeError> {
        let preferred = &context.preferred_language;
        if let Some(content) = self
            .pages
            .select_content(page, preferred, editing)
            .await
            .map_err(ServeError::collaborator("select_content"))?
        {
            return Ok((content, preferred.clone()));
        }

        let available = self
            .pages
            .available_languages(page, editing)
            .await
            .map_err(ServeError::collaborator("available_languages"))?;
        let fallbacks =
            self.languages
                .fallbacks(context.site.id, preferred, context.request.is_privileged);
        for code in fallbacks {
            if !available.contains(&code) {
                continue;
            }
            if let Some(content) = self
                .pages
                .select_content(page, &code, editing)
                .await
                .map_err(ServeError::collaborator("select_content"))?
            {
                debug!(page = %page.id, preferred = %preferred, fallback = %code, "serving fallback language");
                return Ok((content, code));
            }
        }

        Err(ServeError::not_found(
            "page has no content in any candidate language",
        ))
    }

    async fn check_permission(
        &self,
        context: &RequestContext<'_>,
        page: &Page,
    ) -> Result<(), ServeError> {
        let request = context.request;
        if page.login_required && !request.is_authenticated() {
            return Err(ServeError::LoginRequired);
        }
        let allowed = self
            .permissions
            .has_view_permission(&request.viewer(), page, context.site.id)
            .await
            .map_err(ServeError::collaborator("has_view_permission"))?;
        if allowed {
            Ok(())
        } else {
            Err(ServeError::PermissionDenied)
        }
    }

    async fn render(
        &self,
        context: &RequestContext<'_>,
        page: &Page,
        content: &PageContent,
        served_language: &str,
        exposed_redirect: Option<String>,
    ) -> Result<PageResponse, ServeError> {
        let request = context.request;
        let started_at = Instant::now();
        let render_context = RenderContext {
            site_id: context.site.id,
            path: request.path.clone(),
            language: served_language.to_string(),
            viewer: request.viewer(),
            editing: request.is_privileged,
        };
        let fragments = self
            .renderer
            .render_fragments(content, &render_context)
            .await
            .map_err(ServeError::collaborator("render_fragments"))?;

        let prefix = self.config.language_prefix.then_some(served_language);
        let canonical = page_url(prefix, &content.path, self.config.append_slash);
        let html = render_template(
            PageTemplate::new(content, served_language, &fragments).with_canonical(canonical),
        )?;
        histogram!("trellis_page_render_ms").record(started_at.elapsed().as_secs_f64() * 1000.0);
        let body = Bytes::from(html);

        let mut headers = vec![
            (
                "content-type".to_string(),
                "text/html; charset=utf-8".to_string(),
            ),
            ("content-language".to_string(), served_language.to_string()),
        ];
        if let Some(value) = self.xframe_options(page).header_value() {
            headers.push(("x-frame-options".to_string(), value.to_string()));
        }
        if let Some(url) = exposed_redirect {
            headers.push((HEADER_PAGE_REDIRECT.to_string(), url));
        }

        let Some(key) = context.cache_key.as_deref() else {
            return Ok(PageResponse::ok(headers, body));
        };

        let decision = self.ttl.decide(&fragments);
        if decision.cacheable {
            headers.push((
                "cache-control".to_string(),
                format!("max-age={}", decision.ttl),
            ));
            if !decision.vary_on.is_empty() {
                let vary = decision.vary_on.iter().cloned().collect::<Vec<_>>().join(", ");
                headers.push(("vary".to_string(), vary));
            }
            self.cache
                .put(key, body.clone(), headers.clone(), decision.ttl)
                .await;
        } else {
            debug!(page = %page.id, "page is not cacheable");
        }
        headers.push((HEADER_CACHE.to_string(), "MISS".to_string()));
        Ok(PageResponse::ok(headers, body))
    }

    fn xframe_options(&self, page: &Page) -> XFrameOptions {
        match page.xframe_options {
            XFrameOptions::Inherit => self.config.default_xframe_options,
            policy => policy,
        }
    }

    fn cached_response(&self, hit: CachedPage) -> PageResponse {
        let remaining = hit.remaining_seconds(self.cache.now());
        let mut headers: Vec<(String, String)> = hit
            .headers
            .into_iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("cache-control"))
            .collect();
        headers.push(("cache-control".to_string(), format!("max-age={remaining}")));
        headers.push((HEADER_CACHE.to_string(), "HIT".to_string()));
        PageResponse::ok(headers, hit.body)
    }

    fn login_redirect(&self, path: &str) -> String {
        let next: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
        let separator = if self.config.login_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{separator}next={next}", self.config.login_url)
    }

    fn error_response(&self, request: &PageRequest, err: ServeError) -> PageResponse {
        let status = err.status_code();
        if matches!(err, ServeError::LoginRequired) {
            info!(path = %request.path, "anonymous request for a login-only page");
            return PageResponse::redirect(self.login_redirect(&request.path));
        }

        match &err {
            ServeError::Collaborator { .. } | ServeError::Template(_) => error!(
                target_module = SOURCE,
                path = %request.path,
                error = %err,
                "page request failed"
            ),
            _ => debug!(path = %request.path, error = %err, "page request rejected"),
        }

        let mut headers = vec![(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )];
        if status == StatusCode::METHOD_NOT_ALLOWED {
            headers.push(("allow".to_string(), "GET, HEAD".to_string()));
        }
        PageResponse {
            status,
            headers,
            body: Bytes::from(render_error_page(err.presentation_message())),
            report: Some(ErrorReport::from_error(SOURCE, status, &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_headers_are_case_insensitive() {
        let response = PageResponse::redirect("/fr/about/".to_string());
        assert_eq!(response.location(), Some("/fr/about/"));
        assert_eq!(response.header("Location"), Some("/fr/about/"));
        assert_eq!(response.status, StatusCode::FOUND);
    }

    #[test]
    fn request_builder_defaults_to_anonymous_get() {
        let request = PageRequest::get(SiteId(1), "/about/");
        assert_eq!(request.method, Method::GET);
        assert!(!request.is_authenticated());
        assert_eq!(request.viewer(), Viewer::anonymous());

        let editor = request.authenticated("ada").privileged();
        assert!(editor.is_authenticated());
        assert!(editor.viewer().is_privileged);
    }
}
