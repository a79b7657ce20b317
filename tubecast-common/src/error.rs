//! Error type shared by the engine and the CLI bootstrap

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap file unreadable, invalid, or missing a required credential
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed value handed in by a caller (dates, identifiers)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
