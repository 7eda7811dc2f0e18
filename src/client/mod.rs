//! Monitored clients and the factory that builds them.

mod blocking;
mod monitored;
mod request;
mod stream;

use std::sync::Arc;

pub use blocking::BlockingMonitoredClient;
pub use monitored::MonitoredClient;
pub use stream::ChatCompletionStream;

use crate::config::{PrysmConfig, ResolvedConfig};
use crate::ConfigError;

/// Validates a [`PrysmConfig`] once and produces monitored clients from it.
///
/// ```no_run
/// use prysm::{ContextStore, ContextUpdate, PrysmClient, PrysmConfig};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let prysm = PrysmClient::new(PrysmConfig::builder().api_key("sk-prysm-...").build())?;
/// let client = prysm.client()?;
///
/// ContextStore::set(ContextUpdate::new().user_id("user_123"));
/// let models = client.models().await?;
/// # let _ = models;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PrysmClient {
    config: Arc<ResolvedConfig>,
}

impl PrysmClient {
    pub fn new(config: PrysmConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_resolved(config.resolve()?))
    }

    pub fn from_resolved(config: ResolvedConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// An async client routed through the proxy.
    pub fn client(&self) -> Result<MonitoredClient, ConfigError> {
        MonitoredClient::new(self.config.clone())
    }

    /// A blocking client routed through the proxy.
    pub fn blocking_client(&self) -> Result<BlockingMonitoredClient, ConfigError> {
        BlockingMonitoredClient::new(self.config.clone())
    }
}
