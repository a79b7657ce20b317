//! Episode (one media entry of a show)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type of every audio enclosure the engine produces
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// Downloadable media payload descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub length: u64,
    pub mime_type: String,
}

/// Image reference (feed artwork)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub href: String,
}

/// One admitted episode
///
/// Created only after its audio upload succeeded; never modified afterwards,
/// only removed. `added_on` is the eviction clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Source item identifier, unique within the show
    pub guid: String,
    pub author: String,
    /// Handle of the channel the item was published on
    pub source_channel: String,
    pub added_on: DateTime<Utc>,
    pub explicit: String,
    pub title: String,
    pub description: String,
    pub subtitle: String,
    pub summary: String,
    pub duration: String,
    pub views: u64,
    /// RFC 2822 publish date, empty when unknown
    pub pub_date: String,
    pub image: ImageRef,
    pub enclosure: Enclosure,
    pub link: String,
}
