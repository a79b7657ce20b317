//! Video source implementations

pub mod yt_dlp;

pub use yt_dlp::YtDlpSource;
