//! Dropbox storage backend
//!
//! Objects live under the app folder, one folder per namespace. Every
//! uploaded file gets a shared link rewritten to serve the raw bytes
//! (`raw=1`), which is the public URL podcast clients fetch.
//!
//! Authentication uses a long-lived refresh token; short-lived access tokens
//! are fetched on demand and renewed shortly before they expire.

use super::{glob_match, literal_prefix};
use crate::types::{StorageBackend, StorageError, Usage};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const API_BASE_URL: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE_URL: &str = "https://content.dropboxapi.com/2";

/// Renew access tokens this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Largest file sent in a single upload request
const SINGLE_UPLOAD_LIMIT: u64 = 150 * 1024 * 1024;
/// Chunk size for upload sessions
const SESSION_CHUNK_SIZE: usize = 8 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// ============================================================================
// Access tokens
// ============================================================================

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Exchanges the refresh token for access tokens, caching the current one
struct TokenManager {
    app_key: String,
    app_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    fn new(app_key: String, app_secret: String, refresh_token: String) -> Self {
        Self {
            app_key,
            app_secret,
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    async fn access_token(&self, client: &Client) -> Result<String, StorageError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Refreshing Dropbox access token");
        let response = client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.app_key.as_str()),
                ("client_secret", self.app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Parse(e.to_string()))?;

        let fresh = CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }
}

// ============================================================================
// API payloads
// ============================================================================

#[derive(Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'a str,
    autorename: bool,
    mute: bool,
}

#[derive(Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct ListSharedLinksArg<'a> {
    path: &'a str,
    direct_only: bool,
}

#[derive(Deserialize)]
struct SharedLink {
    url: String,
}

#[derive(Deserialize)]
struct SharedLinks {
    links: Vec<SharedLink>,
}

#[derive(Serialize)]
struct ListFolderArg<'a> {
    path: &'a str,
    recursive: bool,
}

#[derive(Serialize)]
struct CursorArg<'a> {
    cursor: &'a str,
}

#[derive(Debug, Deserialize)]
struct FolderEntry {
    #[serde(rename = ".tag")]
    tag: String,
    path_display: String,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct ListFolderResult {
    entries: Vec<FolderEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Deserialize)]
struct SessionStartResult {
    session_id: String,
}

#[derive(Serialize)]
struct SessionCursor<'a> {
    session_id: &'a str,
    offset: u64,
}

#[derive(Serialize)]
struct SessionAppendArg<'a> {
    cursor: SessionCursor<'a>,
    close: bool,
}

#[derive(Serialize)]
struct SessionFinishArg<'a> {
    cursor: SessionCursor<'a>,
    commit: UploadArg<'a>,
}

// ============================================================================
// Backend
// ============================================================================

pub struct DropboxBackend {
    http_client: Client,
    tokens: TokenManager,
}

impl DropboxBackend {
    pub fn new(
        app_key: String,
        app_secret: String,
        refresh_token: String,
    ) -> Result<Self, StorageError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Http(e.to_string()))?;
        Ok(Self {
            http_client,
            tokens: TokenManager::new(app_key, app_secret, refresh_token),
        })
    }

    /// POST a JSON RPC call to the API host
    async fn rpc<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        arg: &T,
    ) -> Result<Response, StorageError> {
        let token = self.tokens.access_token(&self.http_client).await?;
        self.http_client
            .post(format!("{}/{}", API_BASE_URL, endpoint))
            .bearer_auth(token)
            .json(arg)
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))
    }

    /// POST a content call (argument in the `Dropbox-API-Arg` header)
    async fn content<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        arg: &T,
        body: Vec<u8>,
    ) -> Result<Response, StorageError> {
        let token = self.tokens.access_token(&self.http_client).await?;
        let header = header_json(arg)?;
        let response = self
            .http_client
            .post(format!("{}/{}", CONTENT_BASE_URL, endpoint))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", header)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;
        ensure_success(endpoint, response).await
    }

    async fn upload_file(&self, local_path: &Path, path: &str) -> Result<(), StorageError> {
        let local_error = |e: std::io::Error| StorageError::LocalFile {
            path: local_path.to_path_buf(),
            message: e.to_string(),
        };
        let size = tokio::fs::metadata(local_path).await.map_err(local_error)?.len();
        let commit = UploadArg {
            path,
            mode: "overwrite",
            autorename: false,
            mute: true,
        };

        if size <= SINGLE_UPLOAD_LIMIT {
            let body = tokio::fs::read(local_path).await.map_err(local_error)?;
            self.content("files/upload", &commit, body).await?;
            return Ok(());
        }

        // Upload session for large files
        let mut file = tokio::fs::File::open(local_path).await.map_err(local_error)?;
        let start: SessionStartResult = self
            .content("files/upload_session/start", &serde_json::json!({ "close": false }), Vec::new())
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Parse(e.to_string()))?;

        let mut offset = 0u64;
        let mut chunk = vec![0u8; SESSION_CHUNK_SIZE];
        loop {
            let read = read_chunk(&mut file, &mut chunk).await.map_err(local_error)?;
            if read == 0 {
                break;
            }
            let arg = SessionAppendArg {
                cursor: SessionCursor {
                    session_id: &start.session_id,
                    offset,
                },
                close: false,
            };
            self.content("files/upload_session/append_v2", &arg, chunk[..read].to_vec())
                .await?;
            offset += read as u64;
        }

        let finish = SessionFinishArg {
            cursor: SessionCursor {
                session_id: &start.session_id,
                offset,
            },
            commit,
        };
        self.content("files/upload_session/finish", &finish, Vec::new())
            .await?;
        Ok(())
    }

    async fn shared_link(&self, path: &str) -> Result<String, StorageError> {
        let response = self
            .rpc("sharing/create_shared_link_with_settings", &PathArg { path })
            .await?;

        let url = if response.status() == StatusCode::CONFLICT {
            // A link already exists for this path
            let links: SharedLinks = ensure_success(
                "sharing/list_shared_links",
                self.rpc(
                    "sharing/list_shared_links",
                    &ListSharedLinksArg {
                        path,
                        direct_only: true,
                    },
                )
                .await?,
            )
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Parse(e.to_string()))?;
            links
                .links
                .into_iter()
                .next()
                .map(|l| l.url)
                .ok_or_else(|| StorageError::EmptyUrl(path.to_string()))?
        } else {
            let link: SharedLink = ensure_success("sharing/create_shared_link_with_settings", response)
                .await?
                .json()
                .await
                .map_err(|e| StorageError::Parse(e.to_string()))?;
            link.url
        };

        raw_link(&url)
    }

    /// Every file under `/<folder>`; a missing folder has no files
    async fn list_files(&self, folder: &str) -> Result<Vec<FolderEntry>, StorageError> {
        let path = format!("/{}", folder);
        let response = self
            .rpc(
                "files/list_folder",
                &ListFolderArg {
                    path: &path,
                    recursive: true,
                },
            )
            .await?;
        if response.status() == StatusCode::CONFLICT {
            debug!(folder = %folder, "Dropbox folder does not exist");
            return Ok(Vec::new());
        }

        let mut page: ListFolderResult = ensure_success("files/list_folder", response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Parse(e.to_string()))?;
        let mut files = Vec::new();
        loop {
            files.extend(page.entries.into_iter().filter(|e| e.tag == "file"));
            if !page.has_more {
                break;
            }
            page = ensure_success(
                "files/list_folder/continue",
                self.rpc("files/list_folder/continue", &CursorArg { cursor: &page.cursor })
                    .await?,
            )
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Parse(e.to_string()))?;
        }
        Ok(files)
    }
}

#[async_trait]
impl StorageBackend for DropboxBackend {
    fn name(&self) -> &'static str {
        "dropbox"
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        let path = format!("/{}", key);
        self.upload_file(local_path, &path).await?;
        let url = self.shared_link(&path).await?;
        info!(key = %key, "Uploaded to Dropbox");
        Ok(url)
    }

    async fn delete(&self, pattern: &str) -> Result<u64, StorageError> {
        let folder = namespace_of(pattern);
        let mut deleted = 0u64;
        for entry in self.list_files(folder).await? {
            let key = entry.path_display.trim_start_matches('/');
            if !glob_match(pattern, key) {
                continue;
            }
            ensure_success(
                "files/delete_v2",
                self.rpc("files/delete_v2", &PathArg { path: &entry.path_display })
                    .await?,
            )
            .await?;
            deleted += 1;
        }
        info!(pattern = %pattern, count = deleted, "Deleted from Dropbox");
        Ok(deleted)
    }

    async fn usage(&self, namespace: &str) -> Result<Usage, StorageError> {
        let files = self.list_files(namespace).await?;
        Ok(files.iter().fold(Usage::default(), |acc, f| Usage {
            total_bytes: acc.total_bytes + f.size,
            file_count: acc.file_count + 1,
        }))
    }
}

async fn ensure_success(endpoint: &str, response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(StorageError::Auth(format!("{}: {}", endpoint, body)));
    }
    Err(StorageError::Http(format!("{} returned {}: {}", endpoint, status, body)))
}

/// JSON for the `Dropbox-API-Arg` header, which must be plain ASCII
fn header_json<T: Serialize + ?Sized>(arg: &T) -> Result<String, StorageError> {
    let json = serde_json::to_string(arg).map_err(|e| StorageError::Parse(e.to_string()))?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(escaped)
}

async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// First path segment of a key or pattern
fn namespace_of(pattern: &str) -> &str {
    let prefix = literal_prefix(pattern);
    prefix.split('/').next().unwrap_or(prefix)
}

/// Rewrite a shared link so it serves the file itself instead of a preview
pub fn raw_link(shared_url: &str) -> Result<String, StorageError> {
    let mut url = Url::parse(shared_url).map_err(|e| StorageError::Parse(e.to_string()))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "dl" && k != "raw")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("raw", "1");
    Ok(url.to_string())
}
