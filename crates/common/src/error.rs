//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid device filter: {0}")]
    Filter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
