//! Request-context propagation and header injection for the Prysm SDK.
//!
//! [`ContextStore`] keeps one [`RequestContext`] per execution path (thread or
//! task), and [`InjectingTransport`] writes the caller's context onto every
//! request it forwards.

pub mod context;
pub mod headers;
pub mod transport;

pub mod prelude {
    //! Convenient re-exports of commonly used types
    pub use crate::context::{
        ContextError, ContextGuard, ContextStore, ContextUpdate, RequestContext,
    };
    pub use crate::headers::InjectedHeaders;
    pub use crate::transport::{BlockingTransport, InjectingTransport, Transport};
}

// Re-export main types
pub use prelude::*;
