use std::sync::Arc;

use async_openai::types::{
    CreateChatCompletionRequest, CreateChatCompletionResponse, ListModelResponse,
};
use prysm_core::{InjectingTransport, Transport};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::request::{self, PreparedRequest, CHAT_COMPLETIONS_PATH, MODELS_PATH, USER_AGENT};
use super::stream::{chat_completion_chunks, ChatCompletionStream};
use crate::config::ResolvedConfig;
use crate::{ConfigError, PrysmError, PrysmResult};

/// Async client whose every request goes through the Prysm proxy with the
/// caller's [`RequestContext`](prysm_core::RequestContext) attached.
#[derive(Clone)]
pub struct MonitoredClient {
    config: Arc<ResolvedConfig>,
    transport: Arc<dyn Transport>,
}

impl MonitoredClient {
    /// Builds a fresh `reqwest` client bound to `config`.
    pub fn new(config: impl Into<Arc<ResolvedConfig>>) -> Result<Self, ConfigError> {
        let config = config.into();
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        tracing::debug!(
            base_url = config.base_url(),
            timeout_secs = config.timeout().as_secs_f64(),
            upstream_key = config.upstream_api_key().is_some(),
            "created monitored async client"
        );
        Ok(Self::with_transport(config, http))
    }

    /// Sends through `transport` instead of a fresh `reqwest` client.
    pub fn with_transport<T>(config: impl Into<Arc<ResolvedConfig>>, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        let config = config.into();
        let transport = InjectingTransport::with_headers(transport, config.injected_headers());
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn api_key(&self) -> &str {
        self.config.api_key()
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    pub async fn chat_completion(
        &self,
        request: CreateChatCompletionRequest,
    ) -> PrysmResult<CreateChatCompletionResponse> {
        self.post(CHAT_COMPLETIONS_PATH, &request).await
    }

    /// Streams a chat completion; `stream` is forced on.
    pub async fn chat_completion_stream(
        &self,
        mut request: CreateChatCompletionRequest,
    ) -> PrysmResult<ChatCompletionStream> {
        request.stream = Some(true);
        let prepared = PreparedRequest::new(&self.config, Method::POST, CHAT_COMPLETIONS_PATH)?
            .json(&request)?
            .accept_event_stream();

        let response = self.send(prepared).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(request::api_error(status, &body).into());
        }
        Ok(chat_completion_chunks(response.bytes_stream()))
    }

    pub async fn models(&self) -> PrysmResult<ListModelResponse> {
        self.get(MODELS_PATH).await
    }

    /// POSTs `body` as JSON to `path` under the base URL.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> PrysmResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let prepared = PreparedRequest::new(&self.config, Method::POST, path)?.json(body)?;
        self.send_json(prepared).await
    }

    /// GETs `path` under the base URL.
    pub async fn get<R>(&self, path: &str) -> PrysmResult<R>
    where
        R: DeserializeOwned,
    {
        let prepared = PreparedRequest::new(&self.config, Method::GET, path)?;
        self.send_json(prepared).await
    }

    async fn send_json<R>(&self, prepared: PreparedRequest) -> PrysmResult<R>
    where
        R: DeserializeOwned,
    {
        let response = self.send(prepared).await?;
        let status = response.status();
        let body = response.bytes().await?;
        request::decode(status, &body)
    }

    async fn send(&self, prepared: PreparedRequest) -> Result<reqwest::Response, PrysmError> {
        let request = prepared.into_async(&self.config);
        Ok(self.transport.execute(request).await?)
    }
}

impl std::fmt::Debug for MonitoredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
