//! One-call integration: hand over an existing client, get back a monitored
//! client of the same mode.

use crate::client::{BlockingMonitoredClient, MonitoredClient, PrysmClient};
use crate::config::PrysmConfig;
use crate::ConfigError;

/// Clients whose type tells [`monitor`] which mode to build.
///
/// The client itself is only a signal: its transport and credentials are
/// never reused.
pub trait Monitor {
    type Monitored;

    fn monitored(&self, prysm: &PrysmClient) -> Result<Self::Monitored, ConfigError>;
}

impl<C> Monitor for async_openai::Client<C>
where
    C: async_openai::config::Config,
{
    type Monitored = MonitoredClient;

    fn monitored(&self, prysm: &PrysmClient) -> Result<MonitoredClient, ConfigError> {
        prysm.client()
    }
}

impl Monitor for reqwest::Client {
    type Monitored = MonitoredClient;

    fn monitored(&self, prysm: &PrysmClient) -> Result<MonitoredClient, ConfigError> {
        prysm.client()
    }
}

impl Monitor for MonitoredClient {
    type Monitored = MonitoredClient;

    fn monitored(&self, prysm: &PrysmClient) -> Result<MonitoredClient, ConfigError> {
        prysm.client()
    }
}

impl Monitor for reqwest::blocking::Client {
    type Monitored = BlockingMonitoredClient;

    fn monitored(&self, prysm: &PrysmClient) -> Result<BlockingMonitoredClient, ConfigError> {
        prysm.blocking_client()
    }
}

impl Monitor for BlockingMonitoredClient {
    type Monitored = BlockingMonitoredClient;

    fn monitored(&self, prysm: &PrysmClient) -> Result<BlockingMonitoredClient, ConfigError> {
        prysm.blocking_client()
    }
}

/// Builds a client routed through the Prysm proxy, in the same mode as
/// `client`.
///
/// ```no_run
/// use async_openai::{config::OpenAIConfig, Client};
/// use prysm::{monitor, PrysmConfig};
///
/// let original = Client::with_config(OpenAIConfig::new().with_api_key("sk-..."));
/// let monitored = monitor(&original, PrysmConfig::builder().api_key("sk-prysm-...").build())?;
/// # let _ = monitored;
/// # Ok::<(), prysm::ConfigError>(())
/// ```
pub fn monitor<C>(client: &C, config: PrysmConfig) -> Result<C::Monitored, ConfigError>
where
    C: Monitor + ?Sized,
{
    let prysm = PrysmClient::new(config)?;
    client.monitored(&prysm)
}
