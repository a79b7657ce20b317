//! # TubeCast Common Library
//!
//! Shared code for the TubeCast engine and its command-line front-end:
//! - Error type and result alias
//! - TOML bootstrap configuration and root folder resolution
//! - Atomic (write-then-rename) file persistence
//! - Timestamp and feed date helpers

pub mod config;
pub mod error;
pub mod fs;
pub mod time;

pub use error::{Error, Result};
