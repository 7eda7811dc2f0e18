//! Request preparation and response decoding shared by the async and
//! blocking clients.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::{ApiError, PrysmError, PrysmResult};

pub(crate) const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
pub(crate) const MODELS_PATH: &str = "/models";
pub(crate) const USER_AGENT: &str = concat!("prysm-rust/", env!("CARGO_PKG_VERSION"));

/// Everything needed to build a request in either mode.
pub(crate) struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl PreparedRequest {
    pub(crate) fn new(config: &ResolvedConfig, method: Method, path: &str) -> PrysmResult<Self> {
        let url = endpoint(config.base_url(), path)?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, config.authorization().clone());
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            method,
            url,
            headers,
            body: None,
        })
    }

    pub(crate) fn json<B>(mut self, body: &B) -> PrysmResult<Self>
    where
        B: Serialize + ?Sized,
    {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    pub(crate) fn accept_event_stream(mut self) -> Self {
        self.headers
            .insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        self
    }

    pub(crate) fn into_async(self, config: &ResolvedConfig) -> reqwest::Request {
        let mut request = reqwest::Request::new(self.method, self.url);
        *request.headers_mut() = self.headers;
        *request.timeout_mut() = Some(config.timeout());
        if let Some(body) = self.body {
            *request.body_mut() = Some(body.into());
        }
        request
    }

    pub(crate) fn into_blocking(self, config: &ResolvedConfig) -> reqwest::blocking::Request {
        let mut request = reqwest::blocking::Request::new(self.method, self.url);
        *request.headers_mut() = self.headers;
        *request.timeout_mut() = Some(config.timeout());
        if let Some(body) = self.body {
            *request.body_mut() = Some(body.into());
        }
        request
    }
}

/// Joins the base URL and an API path such as `/chat/completions`.
pub(crate) fn endpoint(base_url: &str, path: &str) -> PrysmResult<Url> {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&url).map_err(|err| PrysmError::InvalidUrl(format!("{url}: {err}")))
}

/// Maps a finished response onto the caller's type, or onto an [`ApiError`]
/// for any non-success status.
pub(crate) fn decode<R>(status: StatusCode, body: &[u8]) -> PrysmResult<R>
where
    R: DeserializeOwned,
{
    if !status.is_success() {
        return Err(api_error(status, body).into());
    }
    Ok(serde_json::from_slice(body)?)
}

pub(crate) fn api_error(status: StatusCode, body: &[u8]) -> ApiError {
    let err = ApiError::from_response(status, body);
    tracing::debug!(
        status = err.status,
        kind = %err.kind,
        error_type = ?err.error_type,
        "prysm proxy returned an error"
    );
    err
}
