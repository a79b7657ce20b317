//! archive.org storage backend
//!
//! Objects are files of one archive.org item, managed with the `ia` command
//! line tool (which must be installed and configured with `ia configure`).
//! Object keys map directly to file names inside the item.

use super::{glob_match, literal_prefix};
use crate::types::{StorageBackend, StorageError, Usage};
use crate::utils::process;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, info};

const IA_COMMAND: &str = "ia";
const DOWNLOAD_BASE_URL: &str = "https://archive.org/download/";

/// Files archive.org keeps for its own bookkeeping
const HISTORY_PREFIX: &str = "history/";

pub struct ArchiveBackend {
    identifier: String,
    program: String,
}

impl ArchiveBackend {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            program: IA_COMMAND.to_string(),
        }
    }

    /// Public download URL of an object
    pub fn public_url(&self, key: &str) -> Result<String, StorageError> {
        let mut url = Url::parse(DOWNLOAD_BASE_URL).map_err(|e| StorageError::Parse(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Parse(format!("cannot build URL for {}", key)))?
            .pop_if_empty()
            .push(&self.identifier)
            .extend(key.split('/'));
        Ok(url.to_string())
    }

    async fn list_files(&self) -> Result<Vec<ArchiveFile>, StorageError> {
        let out = process::run(&self.program, ["metadata", self.identifier.as_str()]).await?;
        parse_item_files(&out)
    }
}

#[async_trait]
impl StorageBackend for ArchiveBackend {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        if !local_path.is_file() {
            return Err(StorageError::LocalFile {
                path: local_path.to_path_buf(),
                message: "not a file".to_string(),
            });
        }

        let remote_name = format!("--remote-name={}", key);
        let args: [&OsStr; 5] = [
            OsStr::new("upload"),
            OsStr::new(&self.identifier),
            local_path.as_os_str(),
            OsStr::new(&remote_name),
            OsStr::new("--no-backup"),
        ];
        process::run(&self.program, args).await?;

        let url = self.public_url(key)?;
        info!(item = %self.identifier, key = %key, "Uploaded to archive.org");
        Ok(url)
    }

    async fn delete(&self, pattern: &str) -> Result<u64, StorageError> {
        let matching = self
            .list_files()
            .await?
            .into_iter()
            .filter(|f| glob_match(pattern, &f.name))
            .count() as u64;

        if matching == 0 {
            debug!(item = %self.identifier, pattern = %pattern, "Nothing to delete");
            return Ok(0);
        }

        let glob = format!("--glob={}", pattern);
        process::run(
            &self.program,
            ["delete", self.identifier.as_str(), glob.as_str(), "--no-backup"],
        )
        .await?;

        info!(item = %self.identifier, pattern = %pattern, count = matching, "Deleted from archive.org");
        Ok(matching)
    }

    async fn usage(&self, namespace: &str) -> Result<Usage, StorageError> {
        let files = self.list_files().await?;
        Ok(usage_under(&files, &format!("{}/*", namespace)))
    }
}

/// One file entry of `ia metadata` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub name: String,
    pub size: u64,
}

#[derive(Deserialize)]
struct ItemMetadata {
    #[serde(default)]
    files: Vec<RawFile>,
}

#[derive(Deserialize)]
struct RawFile {
    name: String,
    #[serde(default)]
    size: Option<RawSize>,
}

/// archive.org reports sizes as strings, but not consistently
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Number(u64),
    Text(String),
}

/// Parse `ia metadata` JSON into the item's user files
///
/// A missing item yields `{}`, which is an empty list.
pub fn parse_item_files(json: &str) -> Result<Vec<ArchiveFile>, StorageError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let metadata: ItemMetadata =
        serde_json::from_str(json).map_err(|e| StorageError::Parse(e.to_string()))?;

    metadata
        .files
        .into_iter()
        .filter(|f| !f.name.starts_with(HISTORY_PREFIX))
        .map(|f| {
            let size = match f.size {
                None => 0,
                Some(RawSize::Number(n)) => n,
                Some(RawSize::Text(s)) => s.trim().parse::<u64>().map_err(|e| {
                    StorageError::Parse(format!("size '{}' of {}: {}", s, f.name, e))
                })?,
            };
            Ok(ArchiveFile { name: f.name, size })
        })
        .collect()
}

fn usage_under(files: &[ArchiveFile], pattern: &str) -> Usage {
    let prefix = literal_prefix(pattern);
    files
        .iter()
        .filter(|f| f.name.starts_with(prefix) && glob_match(pattern, &f.name))
        .fold(Usage::default(), |acc, f| Usage {
            total_bytes: acc.total_bytes + f.size,
            file_count: acc.file_count + 1,
        })
}
