//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and keep
//! the write-then-rename dance for durable files in one place.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| io_error("creating directory", parent, e))
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Sibling path used while a file is being replaced.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read a file, returning `None` if it does not exist.
pub async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error("reading", path, e)),
    }
}

/// Replace `path` with `contents` so that readers see either the old or the
/// new file, never a partial one.
///
/// Writes a `.tmp` sibling, fsyncs it, then renames it over the target.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path).await?;
    let tmp = tmp_path(path);

    {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io_error("creating", &tmp, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| io_error("writing", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("syncing", &tmp, e))?;
    }

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error("renaming", path, e))?;

    // Persist the rename itself. Directories cannot be opened for sync on Windows.
    #[cfg(unix)]
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && let Ok(dir) = tokio::fs::File::open(parent).await
    {
        let _ = dir.sync_all().await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmp_path() {
        assert_eq!(
            tmp_path(Path::new("data/state.json")),
            PathBuf::from("data/state.json.tmp")
        );
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(read_optional(&path).await.unwrap().as_deref(), Some("second"));
        assert!(!tmp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_read_optional_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("nope")).await.unwrap().is_none());
    }
}
