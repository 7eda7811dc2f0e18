mod error;
mod result;

pub use error::{ApiError, ApiErrorKind, ConfigError, PrysmError};
pub use result::PrysmResult;
