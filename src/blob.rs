//! Binary storage for uploaded note files.
//!
//! The store only tracks a `blob_ref` per file; the bytes themselves live
//! behind this trait. Upload and download mechanics belong to the hosting
//! environment, so the contract here is deliberately small.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Storage for the binary contents of uploaded files.
pub trait BlobStore {
    /// Writes the bytes for `blob_ref`, overwriting any existing blob.
    fn put(&self, blob_ref: &str, bytes: &[u8]) -> Result<()>;

    /// Removes the blob for `blob_ref`.
    ///
    /// Deleting a missing blob is not an error.
    fn delete(&self, blob_ref: &str) -> Result<()>;
}

/// Filesystem-backed blob store rooted at a directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, blob_ref: &str) -> PathBuf {
        self.root.join(blob_ref)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, blob_ref: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(blob_ref);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create blob directory: {}", parent.display()))?;
        }
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write blob: {}", path.display()))?;
        Ok(())
    }

    fn delete(&self, blob_ref: &str) -> Result<()> {
        let path = self.path_for(blob_ref);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete blob: {}", path.display())),
        }
    }
}
