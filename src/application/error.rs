use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::repos::RepoError, domain::error::DomainError, infra::error::InfraError,
    presentation::views::TemplateRenderError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<RepoError> for HttpError {
    fn from(error: RepoError) -> Self {
        let status = match &error {
            RepoError::NotFound => StatusCode::NOT_FOUND,
            RepoError::InvalidInput { .. } | RepoError::Domain(_) => StatusCode::BAD_REQUEST,
            RepoError::Persistence(_) | RepoError::Render { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let public_message = match status {
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::BAD_REQUEST => "Request could not be processed",
            _ => "Internal server error",
        };
        HttpError::from_error(
            "application::error::repo_error_to_http_error",
            status,
            public_message,
            &error,
        )
    }
}

/// Why a page request could not be answered with content.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("not found: {reason}")]
    NotFound { reason: &'static str },
    #[error("login required")]
    LoginRequired,
    #[error("view permission denied")]
    PermissionDenied,
    #[error("method `{0}` is not allowed")]
    MethodNotAllowed(String),
    #[error("collaborator failure during `{operation}`")]
    Collaborator {
        operation: &'static str,
        #[source]
        source: RepoError,
    },
    #[error(transparent)]
    Template(#[from] TemplateRenderError),
}

impl ServeError {
    pub fn not_found(reason: &'static str) -> Self {
        Self::NotFound { reason }
    }

    pub fn collaborator(operation: &'static str) -> impl FnOnce(RepoError) -> Self {
        move |source| Self::Collaborator { operation, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServeError::NotFound { .. } | ServeError::PermissionDenied => StatusCode::NOT_FOUND,
            ServeError::LoginRequired => StatusCode::FOUND,
            ServeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServeError::Collaborator { .. } | ServeError::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            ServeError::NotFound { .. } | ServeError::PermissionDenied => "Page not found",
            ServeError::LoginRequired => "Login required",
            ServeError::MethodNotAllowed(_) => "Method not allowed",
            ServeError::Collaborator { .. } | ServeError::Template(_) => "Internal server error",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::NotFound { .. })
            | AppError::Repo(RepoError::NotFound)
            | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Domain(_)
            | AppError::Repo(RepoError::InvalidInput { .. })
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Infra(_) | AppError::Repo(_) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::BAD_REQUEST => "Request could not be processed",
            _ => match self {
                AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
                AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
                AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
                AppError::Infra(InfraError::Content { .. }) => "Content archive is invalid",
                _ => "Unexpected error occurred",
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_the_source_chain() {
        let error = ServeError::Collaborator {
            operation: "find_page",
            source: RepoError::from_persistence("connection reset"),
        };
        let report = ErrorReport::from_error("test", error.status_code(), &error);
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            report.messages,
            vec![
                "collaborator failure during `find_page`".to_string(),
                "persistence error: connection reset".to_string(),
            ]
        );
    }

    #[test]
    fn permission_denial_hides_the_page() {
        assert_eq!(ServeError::PermissionDenied.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServeError::LoginRequired.status_code(), StatusCode::FOUND);
        assert_eq!(
            ServeError::not_found("no page").presentation_message(),
            "Page not found"
        );
    }

    #[test]
    fn app_error_statuses() {
        let response = AppError::Repo(RepoError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());

        let response = AppError::validation("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
