use askama::{Error as AskamaError, Template};
use axum::http::StatusCode;
use thiserror::Error;

use crate::application::error::HttpError;
use crate::domain::entities::{ContentFragment, PageContent};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub struct FragmentView {
    pub slot: String,
    pub html: String,
}

#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate {
    pub language: String,
    pub title: String,
    pub template: String,
    pub canonical: Option<String>,
    pub fragments: Vec<FragmentView>,
}

impl PageTemplate {
    pub fn new(content: &PageContent, language: &str, fragments: &[ContentFragment]) -> Self {
        Self {
            language: language.to_string(),
            title: content.title.clone(),
            template: content.template.clone(),
            canonical: None,
            fragments: fragments
                .iter()
                .map(|fragment| FragmentView {
                    slot: fragment.slot.clone(),
                    html: fragment.html.clone(),
                })
                .collect(),
        }
    }

    pub fn with_canonical(self, canonical: String) -> Self {
        Self {
            canonical: Some(canonical),
            ..self
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub heading: &'static str,
}

pub fn render_template<T: Template>(template: T) -> Result<String, TemplateRenderError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
    })
}

/// Error page body; falls back to the bare heading if the template fails.
pub fn render_error_page(heading: &'static str) -> String {
    render_template(ErrorTemplate { heading }).unwrap_or_else(|_| heading.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::PageId;
    use crate::domain::types::{FragmentTtl, Revision};

    fn content() -> PageContent {
        PageContent {
            page_id: PageId::new("about"),
            language: "en".to_string(),
            slug: "about".to_string(),
            path: "about".to_string(),
            title: "Fish & Chips".to_string(),
            template: "default".to_string(),
            redirect: None,
            published: true,
            revision: Revision::Public,
            placeholders: Vec::new(),
        }
    }

    #[test]
    fn page_escapes_title_but_not_fragments() {
        let fragments = vec![ContentFragment::new(
            "content",
            "<p>Hello</p>",
            FragmentTtl::Unbounded,
        )];
        let html = render_template(
            PageTemplate::new(&content(), "en", &fragments).with_canonical("/en/about/".into()),
        )
        .expect("render");

        assert!(html.contains("<html lang=\"en\">"));
        assert!(html.contains("Fish &amp; Chips") || html.contains("Fish &#38; Chips"));
        assert!(html.contains("<section data-slot=\"content\"><p>Hello</p></section>"));
        assert!(html.contains("rel=\"canonical\""));
    }

    #[test]
    fn error_page_carries_heading() {
        assert!(render_error_page("Page not found").contains("<h1>Page not found</h1>"));
    }
}
