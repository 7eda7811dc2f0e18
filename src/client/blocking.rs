use std::sync::Arc;

use async_openai::types::{
    CreateChatCompletionRequest, CreateChatCompletionResponse, ListModelResponse,
};
use prysm_core::{BlockingTransport, InjectingTransport};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::request::{self, PreparedRequest, CHAT_COMPLETIONS_PATH, MODELS_PATH, USER_AGENT};
use crate::config::ResolvedConfig;
use crate::{ConfigError, PrysmResult};

/// Blocking counterpart of [`MonitoredClient`](super::MonitoredClient).
///
/// Must not be created or dropped inside an async runtime, the same
/// restriction as `reqwest::blocking::Client`.
#[derive(Clone)]
pub struct BlockingMonitoredClient {
    config: Arc<ResolvedConfig>,
    transport: Arc<dyn BlockingTransport>,
}

impl BlockingMonitoredClient {
    pub fn new(config: impl Into<Arc<ResolvedConfig>>) -> Result<Self, ConfigError> {
        let config = config.into();
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        tracing::debug!(
            base_url = config.base_url(),
            timeout_secs = config.timeout().as_secs_f64(),
            upstream_key = config.upstream_api_key().is_some(),
            "created monitored blocking client"
        );
        Ok(Self::with_transport(config, http))
    }

    pub fn with_transport<T>(config: impl Into<Arc<ResolvedConfig>>, transport: T) -> Self
    where
        T: BlockingTransport + 'static,
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

    pub fn chat_completion(
        &self,
        request: CreateChatCompletionRequest,
    ) -> PrysmResult<CreateChatCompletionResponse> {
        self.post(CHAT_COMPLETIONS_PATH, &request)
    }

    pub fn models(&self) -> PrysmResult<ListModelResponse> {
        self.get(MODELS_PATH)
    }

    pub fn post<B, R>(&self, path: &str, body: &B) -> PrysmResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let prepared = PreparedRequest::new(&self.config, Method::POST, path)?.json(body)?;
        self.send_json(prepared)
    }

    pub fn get<R>(&self, path: &str) -> PrysmResult<R>
    where
        R: DeserializeOwned,
    {
        let prepared = PreparedRequest::new(&self.config, Method::GET, path)?;
        self.send_json(prepared)
    }

    fn send_json<R>(&self, prepared: PreparedRequest) -> PrysmResult<R>
    where
        R: DeserializeOwned,
    {
        let response = self
            .transport
            .execute(prepared.into_blocking(&self.config))?;
        let status = response.status();
        let body = response.bytes()?;
        request::decode(status, &body)
    }
}

impl std::fmt::Debug for BlockingMonitoredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingMonitoredClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
