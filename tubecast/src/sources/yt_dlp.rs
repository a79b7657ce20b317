//! yt-dlp video source
//!
//! Drives the `yt-dlp` command-line tool, one subprocess per metadata field
//! or media payload.
//!
//! # Requirements
//! - `yt-dlp` on `PATH`
//! - `ffmpeg` on `PATH` (audio extraction and thumbnail conversion)

use crate::types::{ChannelRef, SourceError, VideoSource};
use crate::utils::process;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tubecast_common::time::format_upload_date;

const YT_DLP_COMMAND: &str = "yt-dlp";

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const SITE_URL: &str = "https://www.youtube.com/";

/// Timeout for the channel existence check
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Placeholder yt-dlp prints for missing fields
const MISSING_FIELD: &str = "NA";

pub struct YtDlpSource {
    program: String,
    http_client: Client,
}

impl YtDlpSource {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_program(YT_DLP_COMMAND)
    }

    /// Use a differently named or located yt-dlp binary
    pub fn with_program(program: impl Into<String>) -> Result<Self, SourceError> {
        let http_client = Client::builder()
            .timeout(VALIDATION_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        Ok(Self {
            program: program.into(),
            http_client,
        })
    }

    async fn print_field(&self, item_id: &str, template: &str) -> Result<String, SourceError> {
        let url = self.item_link(item_id);
        let out = process::run(
            &self.program,
            ["--quiet", "--skip-download", "--print", template, url.as_str()],
        )
        .await?;
        let value = out.trim().to_string();
        if value == MISSING_FIELD {
            return Err(SourceError::Parse(format!(
                "{} not available for {}",
                template, item_id
            )));
        }
        Ok(value)
    }

    async fn download(
        &self,
        item_id: &str,
        dest_dir: &Path,
        args: &[&str],
        ext: &str,
    ) -> Result<PathBuf, SourceError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| SourceError::Parse(format!("{}: {}", dest_dir.display(), e)))?;

        let template = dest_dir.join(format!("{}.%(ext)s", item_id));
        let url = self.item_link(item_id);
        let mut cmd_args: Vec<String> = vec!["--quiet".to_string()];
        cmd_args.extend(args.iter().map(|a| a.to_string()));
        cmd_args.push("-o".to_string());
        cmd_args.push(template.to_string_lossy().into_owned());
        cmd_args.push(url);

        process::run(&self.program, &cmd_args).await?;

        let path = dest_dir.join(format!("{}.{}", item_id, ext));
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                debug!(path = %path.display(), bytes = meta.len(), "Downloaded media");
                Ok(path)
            }
            _ => Err(SourceError::MissingMedia(path)),
        }
    }
}

#[async_trait]
impl VideoSource for YtDlpSource {
    async fn resolve_channel(&self, handle: &str) -> Result<ChannelRef, SourceError> {
        let handle = normalize_handle(handle)?;
        let feed_url = channel_url(&handle);

        let response = self
            .http_client
            .get(&feed_url)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Unreachable(format!(
                "{} returned {}",
                feed_url,
                response.status()
            )));
        }

        Ok(ChannelRef { handle, feed_url })
    }

    async fn list_recent_items(
        &self,
        channel: &ChannelRef,
        limit: usize,
    ) -> Result<Vec<String>, SourceError> {
        let limit = limit.to_string();
        let out = process::run(
            &self.program,
            [
                "--flat-playlist",
                "--print",
                "id",
                "--playlist-end",
                limit.as_str(),
                channel.feed_url.as_str(),
            ],
        )
        .await?;
        let ids = parse_id_lines(&out);
        debug!(channel = %channel.handle, ids = ?ids, "Listed recent items");
        Ok(ids)
    }

    async fn resolve_item_id(&self, link: &str) -> Result<String, SourceError> {
        if let Some(id) = item_id_from_link(link) {
            return Ok(id);
        }
        let out = process::run(&self.program, ["--quiet", "--skip-download", "--print", "id", link])
            .await?;
        parse_id_lines(&out)
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::Parse(format!("no item id for {}", link)))
    }

    async fn resolve_source_for_item(&self, link: &str) -> Result<String, SourceError> {
        let link = match item_id_from_link(link) {
            Some(id) => self.item_link(&id),
            None => link.to_string(),
        };
        let out = process::run(
            &self.program,
            ["--quiet", "--skip-download", "--print", "%(uploader_id)s", link.as_str()],
        )
        .await?;
        normalize_handle(out.trim())
    }

    async fn title(&self, item_id: &str) -> Result<String, SourceError> {
        self.print_field(item_id, "%(title)s").await
    }

    async fn description(&self, item_id: &str) -> Result<String, SourceError> {
        self.print_field(item_id, "%(description)s").await
    }

    async fn duration(&self, item_id: &str) -> Result<String, SourceError> {
        self.print_field(item_id, "%(duration_string)s").await
    }

    async fn view_count(&self, item_id: &str) -> Result<u64, SourceError> {
        let out = self.print_field(item_id, "%(view_count)s").await?;
        out.parse::<u64>()
            .map_err(|e| SourceError::Parse(format!("view count '{}': {}", out, e)))
    }

    async fn publish_date(&self, item_id: &str) -> Result<String, SourceError> {
        let out = self.print_field(item_id, "%(upload_date)s").await?;
        format_upload_date(&out).map_err(|e| SourceError::Parse(e.to_string()))
    }

    async fn fetch_thumbnail(
        &self,
        item_id: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, SourceError> {
        self.download(
            item_id,
            dest_dir,
            &["--skip-download", "--write-thumbnail", "--convert-thumbnails", "jpg"],
            "jpg",
        )
        .await
    }

    async fn fetch_audio(&self, item_id: &str, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        self.download(
            item_id,
            dest_dir,
            &["-x", "--audio-format", "mp3", "--audio-quality", "0"],
            "mp3",
        )
        .await
    }

    fn item_link(&self, item_id: &str) -> String {
        format!("{}{}", WATCH_URL, item_id)
    }
}

/// `name`, `@name` or a channel URL → `@name`
pub fn normalize_handle(handle: &str) -> Result<String, SourceError> {
    let trimmed = handle.trim();
    let name = match trimmed.find("youtube.com/@") {
        Some(pos) => {
            let rest = &trimmed[pos + "youtube.com/".len()..];
            rest.split(['/', '?', '#']).next().unwrap_or_default()
        }
        None => trimmed,
    };
    let name = name.trim_start_matches('@');
    if name.is_empty() || name == MISSING_FIELD || name.contains(char::is_whitespace) {
        return Err(SourceError::Parse(format!("invalid channel handle '{}'", handle)));
    }
    Ok(format!("@{}", name))
}

/// Listing URL for a normalised handle
pub fn channel_url(handle: &str) -> String {
    format!("{}{}/videos", SITE_URL, handle)
}

/// Extract an item id from common link shapes without a network call
pub fn item_id_from_link(link: &str) -> Option<String> {
    let link = link.trim();
    if is_bare_id(link) {
        return Some(link.to_string());
    }

    let url = Url::parse(link).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts") | Some("live") | Some("embed") => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        }
        _ => None,
    }?;

    is_bare_id(&candidate).then_some(candidate)
}

fn is_bare_id(value: &str) -> bool {
    (6..=64).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_id_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != MISSING_FIELD)
        .map(str::to_string)
        .collect()
}
