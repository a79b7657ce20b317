//! tubecast library interface
//!
//! Turns video channels into podcast feeds: items are enriched from a video
//! source, their audio is stored on a remote backend under a per-show quota,
//! and every show is kept as a JSON snapshot from which its RSS feed is
//! rendered and published.

pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod models;
pub mod services;
pub mod sources;
pub mod storage;
pub mod types;
pub mod utils;

pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, RemovalReport, ShowSummary};
pub use crate::error::{EngineError, EngineResult, Stage};
