//! Show (a user-created podcast collection with its own feed)

use super::episode::{Episode, ImageRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tubecast_common::config::OwnerConfig;
use tubecast_common::time::parse_pub_date;
use uuid::Uuid;

/// Feed category, optionally nested one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<Box<Category>>,
}

/// Feed owner contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub email: String,
}

/// Durable snapshot of one show
///
/// This is the authoritative record: the public feed document is rendered
/// from it and nothing else. `episodes` keeps insertion order, which is also
/// admission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Public feed URL, empty until the feed was first published
    #[serde(default)]
    pub feed_url: String,
    pub created_on: DateTime<Utc>,
    pub language: String,
    pub copyright: String,
    pub author: String,
    pub subtitle: String,
    pub summary: String,
    pub image: ImageRef,
    pub explicit: String,
    pub categories: Vec<Category>,
    pub owner: Owner,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    /// Subscribed channel handles (`@name`)
    #[serde(default)]
    pub subscribed_channels: BTreeSet<String>,
}

impl Show {
    /// Fresh show with the default channel attributes
    pub fn new(title: &str, description: &str, owner: &OwnerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.to_string(),
            feed_url: String::new(),
            created_on: Utc::now(),
            language: "English".to_string(),
            copyright: owner.username.clone(),
            author: owner.name.clone(),
            subtitle: String::new(),
            summary: description.to_string(),
            image: ImageRef::default(),
            explicit: "no".to_string(),
            categories: vec![Category {
                text: "Technology".to_string(),
                subcategory: None,
            }],
            owner: Owner {
                name: owner.name.clone(),
                email: owner.email.clone(),
            },
            episodes: Vec::new(),
            subscribed_channels: BTreeSet::new(),
        }
    }

    pub fn has_episode(&self, guid: &str) -> bool {
        self.episodes.iter().any(|e| e.guid == guid)
    }

    pub fn episode(&self, guid: &str) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.guid == guid)
    }

    pub fn push_episode(&mut self, episode: Episode) {
        self.episodes.push(episode);
    }

    pub fn remove_episode(&mut self, guid: &str) -> Option<Episode> {
        let index = self.episodes.iter().position(|e| e.guid == guid)?;
        Some(self.episodes.remove(index))
    }

    /// Episode with the minimum `added_on`; the earliest inserted wins ties
    pub fn oldest_episode(&self) -> Option<&Episode> {
        self.episodes.iter().min_by_key(|e| e.added_on)
    }

    /// Sum of enclosure sizes of all episodes
    pub fn enclosure_bytes(&self) -> u64 {
        self.episodes.iter().map(|e| e.enclosure.length).sum()
    }

    /// Episodes as presented to consumers: newest publish date first
    ///
    /// Episodes without a parseable publish date go last; ties are broken by
    /// admission time, newest first.
    pub fn episodes_by_pub_date(&self) -> Vec<&Episode> {
        let mut sorted: Vec<(&Episode, Option<DateTime<Utc>>)> = self
            .episodes
            .iter()
            .map(|e| (e, parse_pub_date(&e.pub_date)))
            .collect();
        sorted.sort_by(|(a, a_date), (b, b_date)| {
            let by_date = match (a_date, b_date) {
                (Some(a), Some(b)) => b.cmp(a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_date.then_with(|| b.added_on.cmp(&a.added_on))
        });
        sorted.into_iter().map(|(e, _)| e).collect()
    }
}
