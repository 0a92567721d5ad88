//! Errors that end a request, and the diagnostics attached to the response.

use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{application::repos::RepoError, domain::error::DomainError, infra::error::InfraError};

/// Diagnostic chain carried in the response extensions for the logging
/// middleware. Never rendered to the client.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let messages = std::iter::successors(Some(error), |&current| current.source())
            .map(ToString::to_string)
            .collect();
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(message))
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Status code and the short text shown to the client.
    fn public_parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Repo(RepoError::InvalidInput { .. }) => {
                (StatusCode::BAD_REQUEST, "Request could not be processed")
            }
            AppError::Repo(RepoError::NotFound) => (StatusCode::NOT_FOUND, "Member not found"),
            AppError::Repo(RepoError::Duplicate { .. }) => {
                (StatusCode::CONFLICT, "Member already registered")
            }
            AppError::Repo(RepoError::Persistence(_)) | AppError::Infra(InfraError::Server { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable")
            }
            AppError::Infra(_) | AppError::Unexpected(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected error occurred")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.public_parts();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}
