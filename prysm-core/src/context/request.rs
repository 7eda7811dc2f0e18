use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::headers;

/// Error type for context construction
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata must serialize to a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Metadata attached to every request routed through the Prysm proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// End-user identity
    pub user_id: Option<String>,
    /// Session or conversation identity
    pub session_id: Option<String>,
    /// Free-form tags, sent as a single JSON object
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True when no field would produce a header.
    pub fn is_empty(&self) -> bool {
        non_empty(&self.user_id).is_none()
            && non_empty(&self.session_id).is_none()
            && self.metadata.is_empty()
    }

    /// Headers describing this context: one per populated field, none for
    /// unset or empty fields.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers::insert_context(self, &mut headers);
        headers
    }

    /// Imperative update: provided fields overwrite, absent ones are kept.
    pub(crate) fn apply(&mut self, update: ContextUpdate) {
        if let Some(user_id) = update.user_id {
            self.user_id = Some(user_id);
        }
        if let Some(session_id) = update.session_id {
            self.session_id = Some(session_id);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
    }

    /// Scoped update: empty overrides inherit, metadata is merged key by key.
    pub(crate) fn merged(&self, update: ContextUpdate) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.extend(update.metadata.unwrap_or_default());

        Self {
            user_id: update
                .user_id
                .filter(|id| !id.is_empty())
                .or_else(|| self.user_id.clone()),
            session_id: update
                .session_id
                .filter(|id| !id.is_empty())
                .or_else(|| self.session_id.clone()),
            metadata,
        }
    }
}

pub(crate) fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

/// A partial [`RequestContext`]: every field is optional and only the
/// provided ones take effect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl ContextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Adds a single metadata entry, starting a new map if none was provided.
    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Uses any serializable value as the metadata map.
    ///
    /// The value has to serialize to a JSON object; anything else is rejected
    /// rather than silently dropped.
    pub fn metadata_from<T>(self, value: &T) -> Result<Self, ContextError>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(self.metadata(map)),
            Value::Null => Err(ContextError::NotAnObject("null")),
            Value::Bool(_) => Err(ContextError::NotAnObject("a boolean")),
            Value::Number(_) => Err(ContextError::NotAnObject("a number")),
            Value::String(_) => Err(ContextError::NotAnObject("a string")),
            Value::Array(_) => Err(ContextError::NotAnObject("an array")),
        }
    }
}

impl From<RequestContext> for ContextUpdate {
    fn from(context: RequestContext) -> Self {
        Self {
            user_id: context.user_id,
            session_id: context.session_id,
            metadata: Some(context.metadata),
        }
    }
}
