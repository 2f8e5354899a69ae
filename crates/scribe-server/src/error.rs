//! Error types for the server and its JSON API.

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use scribe_content::CatalogError;
use scribe_static::TemplateError;
use scribe_store::StoreError;

/// Errors that can occur while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("Invalid listen address {0}")]
    InvalidAddress(String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("OAuth provider {provider}: {message}")]
    OAuth { provider: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// An error returned from a request handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Sign in required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Too many comments, try again in {retry_after} seconds")]
    RateLimited { retry_after: i64 },

    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let Self::Internal(detail) = &self {
            tracing::error!("Request failed: {}", detail);
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what.to_string()),
            StoreError::ParentNotFound(_) => Self::BadRequest(err.to_string()),
            StoreError::Forbidden => Self::Forbidden(err.to_string()),
            StoreError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            StoreError::Invalid(message) => Self::BadRequest(message),
            StoreError::Sqlite(_) | StoreError::Poisoned => Self::Internal(err.to_string()),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        Self::Internal(err.to_string())
    }
}
