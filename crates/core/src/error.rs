use std::result::Result as StdResult;

use thiserror::Error;

/// Errors raised while assembling perftrack configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unsupported database URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = StdResult<T, CoreError>;
