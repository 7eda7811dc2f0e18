//! Header names understood by the Prysm proxy and the single function that
//! derives them, shared by the async and blocking transports.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::context::{non_empty, RequestContext};

pub const USER_ID_HEADER: &str = "x-prysm-user-id";
pub const SESSION_ID_HEADER: &str = "x-prysm-session-id";
pub const METADATA_HEADER: &str = "x-prysm-metadata";
pub const UPSTREAM_KEY_HEADER: &str = "x-prysm-upstream-key";
pub const FORWARD_HEADERS_HEADER: &str = "x-prysm-forward-headers";

/// Static headers fixed when a transport is built.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InjectedHeaders {
    upstream_api_key: Option<String>,
    forward_headers: Option<BTreeMap<String, String>>,
}

impl InjectedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider key the proxy should use instead of the one stored for the
    /// project. Empty keys are ignored.
    pub fn with_upstream_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.upstream_api_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Headers the proxy re-applies to the upstream call. The map is
    /// forwarded as-is; an empty map is ignored.
    pub fn with_forward_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.forward_headers = (!headers.is_empty()).then_some(headers);
        self
    }

    pub fn upstream_api_key(&self) -> Option<&str> {
        self.upstream_api_key.as_deref()
    }

    pub fn forward_headers(&self) -> Option<&BTreeMap<String, String>> {
        self.forward_headers.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.upstream_api_key.is_none() && self.forward_headers.is_none()
    }
}

impl fmt::Debug for InjectedHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedHeaders")
            .field(
                "upstream_api_key",
                &self.upstream_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("forward_headers", &self.forward_headers)
            .finish()
    }
}

/// Writes the context headers into `headers`.
pub fn insert_context(context: &RequestContext, headers: &mut HeaderMap) {
    if let Some(user_id) = non_empty(&context.user_id) {
        insert_raw(headers, USER_ID_HEADER, user_id);
    }
    if let Some(session_id) = non_empty(&context.session_id) {
        insert_raw(headers, SESSION_ID_HEADER, session_id);
    }
    if !context.metadata.is_empty() {
        insert_json(headers, METADATA_HEADER, &context.metadata);
    }
}

/// Writes every Prysm header for one outbound request, overwriting any
/// header of the same name already present.
pub fn inject(context: &RequestContext, injected: &InjectedHeaders, headers: &mut HeaderMap) {
    insert_context(context, headers);

    if let Some(key) = injected.upstream_api_key() {
        if let Ok(mut value) = HeaderValue::from_str(key) {
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(UPSTREAM_KEY_HEADER), value);
        } else {
            tracing::warn!(
                header = UPSTREAM_KEY_HEADER,
                "upstream key is not a valid header value, skipping"
            );
        }
    }
    if let Some(forward) = injected.forward_headers() {
        insert_json(headers, FORWARD_HEADERS_HEADER, forward);
    }

    tracing::trace!(
        headers = ?headers
            .keys()
            .filter(|name| name.as_str().starts_with("x-prysm-"))
            .map(HeaderName::as_str)
            .collect::<Vec<_>>(),
        "injected prysm headers"
    );
}

fn insert_raw(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => tracing::warn!(header = name, "value is not a valid header value, skipping"),
    }
}

fn insert_json<T>(headers: &mut HeaderMap, name: &'static str, value: &T)
where
    T: Serialize + ?Sized,
{
    match to_ascii_json(value) {
        Ok(json) => insert_raw(headers, name, &json),
        Err(err) => tracing::warn!(header = name, error = %err, "failed to encode header, skipping"),
    }
}

/// Compact JSON with every non-ASCII character written as a `\u` escape, so
/// the result is always a legal header value.
pub fn to_ascii_json<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(value)?;
    if json.bytes().all(|b| b.is_ascii() && b != 0x7f) {
        return Ok(json);
    }

    let mut escaped = String::with_capacity(json.len() + 16);
    for ch in json.chars() {
        if ch.is_ascii() && ch != '\u{7f}' {
            escaped.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(escaped)
}
