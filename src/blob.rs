//! Upload storage keyed by filename
//!
//! Listings only ever hold image filenames. The bytes live in an upload
//! directory owned by the upload endpoint; this module is the narrow piece the
//! core needs, which is deleting files a listing no longer references.

use std::io;
use std::path::{Path, PathBuf};

pub trait BlobStore: Send + Sync {
    /// Deletes the blob stored under `filename`. Removing a missing blob succeeds.
    fn remove(&self, filename: &str) -> io::Result<()>;
}

/// Blobs stored as plain files in a single directory.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, filename: &str) -> io::Result<PathBuf> {
        // Only bare file names, never `../x` or `a/b`.
        match Path::new(filename).file_name() {
            Some(name) if name == filename => Ok(self.root.join(name)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid blob name: {filename}"),
            )),
        }
    }
}

impl BlobStore for DiskBlobStore {
    fn remove(&self, filename: &str) -> io::Result<()> {
        let path = self.path_for(filename)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Removes every blob in `filenames`, logging failures instead of returning them.
pub fn remove_all<'a>(store: &dyn BlobStore, filenames: impl IntoIterator<Item = &'a String>) {
    for filename in filenames {
        if let Err(err) = store.remove(filename) {
            tracing::warn!(%filename, error = %err, "failed to remove upload");
        }
    }
}
