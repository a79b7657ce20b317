//! Podcast feed rendering
//!
//! RSS 2.0 with the iTunes podcast namespace. The document is a pure function
//! of the show snapshot: no build timestamp and no self link, so rendering
//! the same snapshot twice yields the same bytes.

use crate::error::{EngineError, EngineResult};
use crate::models::{Category, Episode, Show};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Render the feed document of `show`
pub fn render(show: &Show) -> EngineResult<String> {
    let mut feed = FeedWriter::new();

    feed.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    feed.start_with(
        "rss",
        &[
            ("version", "2.0"),
            ("xmlns:itunes", ITUNES_NS),
            ("xmlns:content", CONTENT_NS),
        ],
    )?;
    feed.start("channel")?;

    feed.text_element("title", &show.title)?;
    feed.text_element("description", &show.description)?;
    feed.text_element("language", &show.language)?;
    feed.text_element("copyright", &show.copyright)?;
    feed.text_element("itunes:author", &show.author)?;
    feed.text_element("itunes:subtitle", &show.subtitle)?;
    feed.text_element("itunes:summary", &show.summary)?;
    feed.text_element("itunes:explicit", &show.explicit)?;
    if !show.image.href.is_empty() {
        feed.empty("itunes:image", &[("href", show.image.href.as_str())])?;
        feed.start("image")?;
        feed.text_element("url", &show.image.href)?;
        feed.text_element("title", &show.title)?;
        feed.end("image")?;
    }
    for category in &show.categories {
        feed.category(category)?;
    }
    feed.start("itunes:owner")?;
    feed.text_element("itunes:name", &show.owner.name)?;
    feed.text_element("itunes:email", &show.owner.email)?;
    feed.end("itunes:owner")?;

    for episode in show.episodes_by_pub_date() {
        feed.item(episode)?;
    }

    feed.end("channel")?;
    feed.end("rss")?;
    feed.finish()
}

struct FeedWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl FeedWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> EngineResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| EngineError::Persistence(format!("feed rendering failed: {}", e)))
    }

    fn start(&mut self, name: &str) -> EngineResult<()> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn start_with(&mut self, name: &str, attributes: &[(&str, &str)]) -> EngineResult<()> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        self.event(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> EngineResult<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> EngineResult<()> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        self.event(Event::Empty(element))
    }

    fn text_element(&mut self, name: &str, text: &str) -> EngineResult<()> {
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn category(&mut self, category: &Category) -> EngineResult<()> {
        match &category.subcategory {
            None => self.empty("itunes:category", &[("text", category.text.as_str())]),
            Some(sub) => {
                self.start_with("itunes:category", &[("text", category.text.as_str())])?;
                self.category(sub)?;
                self.end("itunes:category")
            }
        }
    }

    fn item(&mut self, episode: &Episode) -> EngineResult<()> {
        self.start("item")?;
        self.start_with("guid", &[("isPermaLink", "false")])?;
        self.event(Event::Text(BytesText::new(&episode.guid)))?;
        self.end("guid")?;
        self.text_element("title", &episode.title)?;
        self.text_element("description", &episode.description)?;
        if !episode.link.is_empty() {
            self.text_element("link", &episode.link)?;
        }
        if !episode.pub_date.is_empty() {
            self.text_element("pubDate", &episode.pub_date)?;
        }
        self.text_element("itunes:author", &episode.author)?;
        self.text_element("itunes:subtitle", &episode.subtitle)?;
        self.text_element("itunes:summary", &episode.summary)?;
        self.text_element("itunes:duration", &episode.duration)?;
        self.text_element("itunes:explicit", &episode.explicit)?;
        if !episode.image.href.is_empty() {
            self.empty("itunes:image", &[("href", episode.image.href.as_str())])?;
        }
        let length = episode.enclosure.length.to_string();
        self.empty(
            "enclosure",
            &[
                ("url", episode.enclosure.url.as_str()),
                ("length", length.as_str()),
                ("type", episode.enclosure.mime_type.as_str()),
            ],
        )?;
        self.end("item")
    }

    fn finish(self) -> EngineResult<String> {
        let bytes = self.writer.into_inner().into_inner();
        String::from_utf8(bytes)
            .map_err(|e| EngineError::Persistence(format!("feed is not UTF-8: {}", e)))
    }
}
