use crate::PrysmError;

pub type PrysmResult<T> = Result<T, PrysmError>;
