//! Atomic file persistence
//!
//! Every durable file TubeCast owns (show snapshots, rendered feeds, the
//! bootstrap config) is replaced with write-to-temporary-then-rename. The
//! temporary file lives in the destination directory so the rename never
//! crosses a filesystem boundary; a reader of the canonical path observes
//! either the previous complete file or the new complete file.

use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Prefix marking in-flight temporary files
const TEMP_PREFIX: &str = ".";
/// Infix separating the destination name from the random suffix
const TEMP_INFIX: &str = ".tmp-";

/// Atomically replace `path` with `contents`
///
/// Creates parent directories as needed. On any failure the temporary file is
/// removed and the file at `path` is left untouched.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = temp_path_for(path)?;
    if let Some(parent) = tmp.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether a directory entry name belongs to an in-flight atomic write
pub fn is_temp_artifact(file_name: &str) -> bool {
    file_name.starts_with(TEMP_PREFIX) && file_name.contains(TEMP_INFIX)
}

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        )
    })?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(
        "{}{}{}{}",
        TEMP_PREFIX,
        file_name.to_string_lossy(),
        TEMP_INFIX,
        Uuid::new_v4().simple()
    )))
}
