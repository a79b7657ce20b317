//! Remote storage backends
//!
//! Two interchangeable implementations of [`StorageBackend`]:
//! - **archive**: an archive.org item driven through the `ia` CLI
//! - **dropbox**: a Dropbox app folder over the HTTP API

pub mod archive;
pub mod dropbox;

pub use archive::ArchiveBackend;
pub use dropbox::DropboxBackend;

use crate::config::{
    missing_secret, BackendSecrets, ARCHIVE_ID_ENV, DROPBOX_APP_KEY_ENV, DROPBOX_APP_SECRET_ENV,
    DROPBOX_REFRESH_TOKEN_ENV,
};
use crate::types::StorageBackend;
use std::sync::Arc;
use tubecast_common::config::BackendKind;
use tubecast_common::Result;

/// Build the configured backend
pub fn build_backend(
    kind: BackendKind,
    secrets: &BackendSecrets,
) -> Result<Arc<dyn StorageBackend>> {
    match kind {
        BackendKind::Archive => {
            let identifier = secrets
                .archive_id
                .clone()
                .ok_or_else(|| missing_secret(ARCHIVE_ID_ENV, "archive_id"))?;
            Ok(Arc::new(ArchiveBackend::new(identifier)))
        }
        BackendKind::Dropbox => {
            let app_key = secrets
                .dropbox_app_key
                .clone()
                .ok_or_else(|| missing_secret(DROPBOX_APP_KEY_ENV, "dropbox_app_key"))?;
            let app_secret = secrets
                .dropbox_app_secret
                .clone()
                .ok_or_else(|| missing_secret(DROPBOX_APP_SECRET_ENV, "dropbox_app_secret"))?;
            let refresh_token = secrets.dropbox_refresh_token.clone().ok_or_else(|| {
                missing_secret(DROPBOX_REFRESH_TOKEN_ENV, "dropbox_refresh_token")
            })?;
            let backend = DropboxBackend::new(app_key, app_secret, refresh_token)
                .map_err(|e| tubecast_common::Error::Config(e.to_string()))?;
            Ok(Arc::new(backend))
        }
    }
}

/// Match an object key against a pattern
///
/// `*` matches any run of characters (including `/`), `?` exactly one.
/// Everything else matches literally.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0usize, 0usize);
    // Position of the last `*` seen and the name index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) && p[pi] != '*' {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ni));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ni = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

/// Literal prefix of a pattern, up to the first wildcard
pub(crate) fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?']) {
        Some(pos) => &pattern[..pos],
        None => pattern,
    }
}
