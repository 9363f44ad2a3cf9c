//! On-disk storage for uploaded plushie photos.
//!
//! Files are written under a single directory with unguessable names of the
//! form `<uuid>.<ext>`. Only a sanitized extension of the client's file name
//! survives; everything else the client says about the file is ignored.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Extension used when the client supplies none (or a useless one)
pub const DEFAULT_EXTENSION: &str = "dat";

/// Longest extension kept from a client file name
const MAX_EXTENSION_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("file exceeds the maximum upload size of {0} bytes")]
    TooLarge(usize),

    #[error("invalid stored file name")]
    InvalidName,

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_file_bytes: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    pub async fn ensure_root(&self) -> Result<(), UploadError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Write `data` under a fresh name and return that name.
    ///
    /// The returned value is the bare file name, relative to [`Self::root`].
    pub async fn save(&self, original_name: Option<&str>, data: &[u8]) -> Result<String, UploadError> {
        if data.len() > self.max_file_bytes {
            return Err(UploadError::TooLarge(self.max_file_bytes));
        }

        let file_name = format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            sanitize_extension(original_name)
        );

        self.ensure_root().await?;
        fs::write(self.root.join(&file_name), data).await?;

        debug!(file = %file_name, size = data.len(), "Stored upload");
        Ok(file_name)
    }

    /// Remove a stored file. Failures are logged and otherwise ignored.
    pub async fn remove(&self, file_name: &str) {
        let path = match self.resolve(file_name) {
            Ok(path) => path,
            Err(_) => {
                warn!(file = %file_name, "Refusing to remove file outside uploads directory");
                return;
            }
        };

        match fs::remove_file(&path).await {
            Ok(()) => debug!(file = %file_name, "Removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %file_name, error = %e, "Failed to remove upload"),
        }
    }

    /// Map a stored name back to its path, rejecting anything that is not a
    /// plain file name.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf, UploadError> {
        if file_name.is_empty()
            || file_name.contains("..")
            || file_name.contains('/')
            || file_name.contains('\\')
        {
            return Err(UploadError::InvalidName);
        }
        Ok(self.root.join(file_name))
    }
}

/// Lower-cased ASCII alphanumeric extension of `name`, or [`DEFAULT_EXTENSION`]
pub fn sanitize_extension(name: Option<&str>) -> String {
    let ext = name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return DEFAULT_EXTENSION.to_string();
    }
    ext.to_ascii_lowercase()
}
