//! Request-scoped metadata and the per-execution-path store that carries it.

mod request;
mod store;


pub use request::{ContextError, ContextUpdate, RequestContext};
pub(crate) use request::non_empty;
pub use store::{ContextGuard, ContextStore};
