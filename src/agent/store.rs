use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::vault::Secret;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token file {path} already exists")]
    AlreadyExists { path: PathBuf },

    #[error("could not write token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not encode secret: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The persisted credential file. Written at most once per agent lifetime.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the file; the current directory for bare names.
    pub fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Make sure the directory exists so it can be watched.
    pub async fn prepare(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.directory())
            .await
            .map_err(|source| StoreError::Io { path: self.directory().to_path_buf(), source })
    }

    /// Remove a file left by a previous lifetime. Returns whether one existed.
    pub async fn remove_stale(&self) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed stale token file");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path: self.path.clone(), source }),
        }
    }

    /// Write `secret` to a private temp file next to the destination, sync
    /// it, then publish it under the final name without replacing anything.
    /// Readers therefore see either no file or the complete one. Fails with
    /// [`StoreError::AlreadyExists`] if any file is already there.
    pub async fn persist(&self, secret: &Secret) -> Result<(), StoreError> {
        let contents = serde_json::to_vec(secret)?;
        let path = self.path.clone();
        let directory = self.directory().to_path_buf();

        tokio::task::spawn_blocking(move || publish_exclusive(&directory, &path, &contents))
            .await
            .map_err(|e| StoreError::Io { path: self.path.clone(), source: io::Error::other(e) })??;

        info!(path = %self.path.display(), "Wrote token file");
        Ok(())
    }
}

fn publish_exclusive(directory: &Path, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let io_error = |source: io::Error| StoreError::Io { path: path.to_path_buf(), source };

    // NamedTempFile is created 0600 and unlinked on drop if never published.
    let mut tmp = tempfile::Builder::new()
        .prefix(".courier-token-")
        .tempfile_in(directory)
        .map_err(io_error)?;
    tmp.write_all(contents).map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;

    tmp.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            StoreError::AlreadyExists { path: path.to_path_buf() }
        } else {
            debug!(path = %path.display(), error = %e.error, "Publishing token file failed");
            io_error(e.error)
        }
    })?;
    Ok(())
}
