//! Identifier deduplication
//!
//! Runs before any enrichment work so a known item never costs a network or
//! storage call.

use crate::models::Show;
use std::collections::HashSet;

/// Whether `guid` is already an episode of `show`
pub fn is_duplicate(show: &Show, guid: &str) -> bool {
    show.has_episode(guid)
}

/// Candidates not yet in `show`, in their original order
///
/// Repeats within `candidates` are dropped too, keeping the first.
pub fn filter_new(show: &Show, candidates: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = show.episodes.iter().map(|e| e.guid.as_str()).collect();
    let mut fresh = Vec::new();
    for id in candidates {
        if seen.insert(id.as_str()) {
            fresh.push(id.clone());
        }
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Enclosure, Episode, ImageRef};
    use chrono::Utc;
    use tubecast_common::config::OwnerConfig;

    fn show_with(guids: &[&str]) -> Show {
        let mut show = Show::new("Tech Talks", "desc", &OwnerConfig::default());
        for guid in guids {
            show.push_episode(Episode {
                guid: guid.to_string(),
                author: String::new(),
                source_channel: String::new(),
                added_on: Utc::now(),
                explicit: "no".to_string(),
                title: String::new(),
                description: String::new(),
                subtitle: String::new(),
                summary: String::new(),
                duration: String::new(),
                views: 0,
                pub_date: String::new(),
                image: ImageRef::default(),
                enclosure: Enclosure::default(),
                link: String::new(),
            });
        }
        show
    }

    #[test]
    fn test_filter_new_preserves_order() {
        let show = show_with(&["b"]);
        let candidates: Vec<String> = ["c", "b", "a", "c", "d"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(filter_new(&show, &candidates), vec!["c", "a", "d"]);
    }

    #[test]
    fn test_is_duplicate() {
        let show = show_with(&["abc123"]);
        assert!(is_duplicate(&show, "abc123"));
        assert!(!is_duplicate(&show, "def456"));
    }

    #[test]
    fn test_filter_new_empty() {
        let show = show_with(&[]);
        assert!(filter_new(&show, &[]).is_empty());
    }
}
