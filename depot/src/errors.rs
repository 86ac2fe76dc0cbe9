use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request Content-Type is absent, not multipart, or missing its boundary
    /// parameter. Raised before any body byte is read.
    #[error("invalid multipart Content-Type: {message}")]
    InvalidContentType { message: String },

    /// The body stream ended or lost framing before a well-formed boundary
    /// sequence was found.
    #[error("malformed multipart stream: {message}")]
    MalformedStream { message: String },

    /// The multipart body contained no parts at all.
    #[error("multipart body contained no parts")]
    EmptyBody,

    /// Reading from the request body failed (client disconnect, timeout).
    /// Fatal to the whole request.
    #[error("transport read failed: {message}")]
    TransportRead { message: String },

    /// Storage could not be prepared (destination directory missing and
    /// uncreatable, permissions). Isolated per-part write failures are not
    /// errors; they surface as part outcomes instead.
    #[error("storage unavailable: {0}")]
    Storage(#[source] std::io::Error),

    /// Generic internal service error
    #[error("failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedStream { message: message.into() }
    }

    pub fn invalid_content_type(message: impl Into<String>) -> Self {
        Error::InvalidContentType { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidContentType { .. } => StatusCode::BAD_REQUEST,
            Error::MalformedStream { .. } => StatusCode::BAD_REQUEST,
            Error::EmptyBody => StatusCode::BAD_REQUEST,
            // The client is usually gone by the time this is mapped, but a
            // half-broken request still deserves a client-error status.
            Error::TransportRead { .. } => StatusCode::BAD_REQUEST,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidContentType { .. } => {
                "Expected a multipart/form-data or multipart/mixed request with a boundary parameter".to_string()
            }
            Error::MalformedStream { .. } => "Malformed multipart body".to_string(),
            Error::EmptyBody => "No parts found in multipart body".to_string(),
            Error::TransportRead { .. } => "Request body could not be read".to_string(),
            Error::Storage(_) => "Upload storage is unavailable".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Storage(_) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::TransportRead { .. } => {
                tracing::warn!("Transport error: {}", self);
            }
            Error::InvalidContentType { .. } | Error::MalformedStream { .. } | Error::EmptyBody => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
