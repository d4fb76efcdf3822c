//! Error types for the proxy.

use thiserror::Error;

use crate::translate::anthropic_types::ErrorResponse;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A required field was missing from a non-streaming destination response.
    #[error("Translation error: {message}")]
    Translation { message: String },

    /// The destination answered with a non-2xx status.
    #[error("Azure API error: {status} - {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation {
            message: msg.into(),
        }
    }

    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// HTTP status to report to the caller. Upstream failures keep their status.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => 500,
        }
    }

    /// Render the error in the source error envelope.
    #[must_use]
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            Self::Upstream { status, body } if *status >= 500 => {
                ErrorResponse::api_error(format!("Azure API error: {body}"))
            }
            Self::Upstream { body, .. } => {
                ErrorResponse::invalid_request(format!("Azure API error: {body}"))
            }
            other => ErrorResponse::api_error(format!("Internal server error: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
