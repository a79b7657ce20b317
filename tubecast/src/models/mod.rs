//! Durable data model: shows and their episodes

pub mod episode;
pub mod show;

pub use episode::{Enclosure, Episode, ImageRef, AUDIO_MIME_TYPE};
pub use show::{Category, Owner, Show};
