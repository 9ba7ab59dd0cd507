//! Client-facing error responses.
//!
//! Handlers return `Err(ServerError::..)`; the [`IntoResponse`] impl turns
//! each variant into a status code and a short plain-text body. Internal
//! detail (paths, OS errors) is kept for logging and never sent.

use std::path::PathBuf;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Methods the file server answers.
pub const ALLOWED_METHODS: &str = "GET, HEAD, PUT, OPTIONS";

#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or bad credentials, or no permission for the path. Both
    /// produce the same login challenge.
    #[error("Unauthorised.")]
    Unauthorized,

    /// Declared body size exceeds the configured maximum.
    #[error("Request Body Too Large")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Method Not Supported")]
    MethodNotAllowed,

    /// Nothing servable at the path: missing, or neither file nor directory.
    #[error("Not Found")]
    NotFound,

    #[error("Could not list directory")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not create required directories")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File Create Error")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Write Error")]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::ReadDirectory { .. }
            | ServerError::CreateDirectory { .. }
            | ServerError::CreateFile { .. }
            | ServerError::Write { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = format!("{self}\n");

        match self {
            ServerError::Unauthorized => (
                status,
                [(header::WWW_AUTHENTICATE, "Basic")],
                body,
            )
                .into_response(),
            ServerError::MethodNotAllowed => {
                (status, [(header::ALLOW, ALLOWED_METHODS)], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
