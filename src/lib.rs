//! Prysm is an observability SDK for LLM applications.
//!
//! It routes OpenAI-compatible API calls through the Prysm proxy and tags
//! each request with the caller's user id, session id and metadata, taken
//! from the [`ContextStore`] of whichever thread or task sends it.

pub mod client;
pub mod config;
pub mod monitor;
pub mod types;

pub use prysm_core::{context, headers, transport};

pub mod prelude {
    //! Convenient re-exports of commonly used types
    pub use crate::client::{
        BlockingMonitoredClient, ChatCompletionStream, MonitoredClient, PrysmClient,
    };
    pub use crate::config::{PrysmConfig, PrysmConfigBuilder, ResolvedConfig};
    pub use crate::monitor::{monitor, Monitor};
    pub use crate::types::{ApiError, ApiErrorKind, ConfigError, PrysmError, PrysmResult};
    pub use prysm_core::prelude::*;
}

// Re-export main types
pub use prelude::*;
