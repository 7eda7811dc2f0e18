use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Error type for client construction
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Prysm API key is required. Pass api_key or set the PRYSM_API_KEY environment variable.")]
    MissingApiKey,

    #[error("Invalid Prysm API key format. Expected 'sk-prysm-...' but got '{prefix}...'")]
    InvalidApiKeyFormat { prefix: String },

    #[error("Invalid Prysm base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Error type for requests made through a monitored client
#[derive(Error, Debug)]
pub enum PrysmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    // Anything the transport reports, returned unchanged
    #[error("Transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Stream: {0}")]
    Stream(String),
}

impl PrysmError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            PrysmError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.api_error()
            .is_some_and(|err| err.kind == ApiErrorKind::Authentication)
    }

    pub fn is_server(&self) -> bool {
        self.api_error()
            .is_some_and(|err| err.kind == ApiErrorKind::Server)
    }
}

/// Category of a non-success response from the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    BadRequest,
    Authentication,
    PermissionDenied,
    NotFound,
    Conflict,
    UnprocessableEntity,
    RateLimit,
    Server,
    Other,
}

impl ApiErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => ApiErrorKind::BadRequest,
            401 => ApiErrorKind::Authentication,
            403 => ApiErrorKind::PermissionDenied,
            404 => ApiErrorKind::NotFound,
            409 => ApiErrorKind::Conflict,
            422 => ApiErrorKind::UnprocessableEntity,
            429 => ApiErrorKind::RateLimit,
            s if s >= 500 => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiErrorKind::BadRequest => "Bad request",
            ApiErrorKind::Authentication => "Authentication",
            ApiErrorKind::PermissionDenied => "Permission denied",
            ApiErrorKind::NotFound => "Not found",
            ApiErrorKind::Conflict => "Conflict",
            ApiErrorKind::UnprocessableEntity => "Unprocessable entity",
            ApiErrorKind::RateLimit => "Rate limit",
            ApiErrorKind::Server => "Server",
            ApiErrorKind::Other => "API",
        };
        f.write_str(name)
    }
}

/// A non-success response from the proxy or the upstream behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error (HTTP {status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub kind: ApiErrorKind,
    pub message: String,
    pub error_type: Option<String>,
    pub code: Option<String>,
}

// OpenAI-style error envelope: {"error": {"message", "type", "code"}}
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<Value>,
}

impl ApiError {
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let kind = ApiErrorKind::from_status(status);
        let fallback = || {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                text
            }
        };

        match serde_json::from_slice::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope { error }) => Self {
                status: status.as_u16(),
                kind,
                message: error.message.unwrap_or_else(fallback),
                error_type: error.error_type,
                code: error.code.and_then(|code| match code {
                    Value::String(code) => Some(code),
                    Value::Null => None,
                    other => Some(other.to_string()),
                }),
            },
            Err(_) => Self {
                status: status.as_u16(),
                kind,
                message: fallback(),
                error_type: None,
                code: None,
            },
        }
    }
}
