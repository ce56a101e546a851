//! Filesystem object backend.
//!
//! Objects live in a sharded directory structure, with metadata sidecars in a
//! parallel tree and in-flight writes isolated under `tmp/`:
//!
//! ```text
//! {base_path}/
//! ├── blobs/
//! │   ├── ab/
//! │   │   └── ab12cd34-...-7.png
//! │   └── ...
//! ├── meta/
//! │   ├── ab/
//! │   │   └── ab12cd34-...-7.png.json
//! │   └── ...
//! └── tmp/
//! ```
//!
//! A write streams into a temp file first and is renamed into `blobs/` only
//! after a successful flush and sync, so readers never observe a partial
//! object. Aborted and interrupted writes leave at most an orphan under
//! `tmp/`, which is swept on construction.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::meta::ObjectMeta;

const BLOBS_DIR: &str = "blobs";
const META_DIR: &str = "meta";
const TMP_DIR: &str = "tmp";

/// Errors opening an object for reading.
#[derive(Error, Debug)]
pub enum OpenError {
    /// No object exists under the key.
    #[error("object not found")]
    NotFound,

    /// The backend failed in some other way.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Filesystem-backed object store.
#[derive(Debug, Clone)]
pub struct FsStore {
    /// Base directory for object storage.
    base_path: PathBuf,
}

/// An in-flight write: a temp file that is not yet visible to readers.
///
/// Feed bytes into [`PendingObject::file_mut`], then hand the pending object
/// back to [`FsStore::commit`]. Dropping it without committing removes the
/// temp file, so a failed or cancelled upload leaves nothing behind; the
/// startup sweep covers writes interrupted by a crash.
#[derive(Debug)]
pub struct PendingObject {
    tmp_path: PathBuf,
    file: File,
}

impl PendingObject {
    /// Writer for the object content.
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for PendingObject {
    fn drop(&mut self) {
        // After a successful commit the temp path no longer exists and this
        // is a no-op.
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

impl FsStore {
    /// Open a store at the given base path, creating the directory layout if
    /// needed and sweeping temp files left by interrupted writes.
    ///
    /// Call once at process start; the sweep assumes no writes are in
    /// flight.
    pub fn new(base_path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(base_path.join(BLOBS_DIR))?;
        std::fs::create_dir_all(base_path.join(META_DIR))?;
        std::fs::create_dir_all(base_path.join(TMP_DIR))?;

        let store = Self { base_path };
        let swept = store.sweep_tmp()?;
        if swept > 0 {
            tracing::info!(swept, "removed stale temp files from interrupted writes");
        }

        Ok(store)
    }

    /// Get the base path of this store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Start a write. The returned temp file is invisible to readers until
    /// committed.
    pub async fn begin(&self) -> io::Result<PendingObject> {
        let tmp_path = self
            .base_path
            .join(TMP_DIR)
            .join(Uuid::new_v4().to_string());
        let file = File::create(&tmp_path).await?;

        Ok(PendingObject { tmp_path, file })
    }

    /// Publish a pending write under `key`.
    ///
    /// The metadata sidecar is written first and the blob renamed into place
    /// last; the rename is the single step that makes the object visible.
    pub async fn commit(
        &self,
        mut pending: PendingObject,
        key: &str,
        meta: &ObjectMeta,
    ) -> io::Result<()> {
        pending.file.flush().await?;
        pending.file.sync_all().await?;

        let blob_path = self.blob_path(key);
        let meta_path = self.meta_path(key);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let meta_bytes = serde_json::to_vec(meta)?;
        fs::write(&meta_path, meta_bytes).await?;

        if let Err(e) = fs::rename(&pending.tmp_path, &blob_path).await {
            // The blob never became visible; the orphaned sidecar must not
            // outlive it. The temp file is removed when `pending` drops.
            let _ = fs::remove_file(&meta_path).await;
            return Err(e);
        }

        Ok(())
    }

    /// Open an object for reading.
    ///
    /// Returns the blob file handle positioned at offset 0 and the metadata
    /// sidecar if one exists. The handle is released when dropped.
    pub async fn open(&self, key: &str) -> Result<(File, Option<ObjectMeta>), OpenError> {
        let file = match File::open(self.blob_path(key)).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(OpenError::NotFound),
            Err(e) => return Err(OpenError::Io(e)),
        };

        let meta = match fs::read(self.meta_path(key)).await {
            Ok(bytes) => Some(serde_json::from_slice(&bytes).map_err(io::Error::from)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(key, "object has no metadata sidecar");
                None
            }
            Err(e) => return Err(OpenError::Io(e)),
        };

        Ok((file, meta))
    }

    /// Remove everything under `tmp/`. Only safe while no writes are in
    /// flight.
    fn sweep_tmp(&self) -> io::Result<usize> {
        let mut removed = 0;

        for entry in std::fs::read_dir(self.base_path.join(TMP_DIR))? {
            let entry = entry?;
            if std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Full path of the blob for a key: {base}/blobs/{shard}/{key}.
    fn blob_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(BLOBS_DIR)
            .join(Self::shard(key))
            .join(key)
    }

    /// Full path of the metadata sidecar: {base}/meta/{shard}/{key}.json.
    fn meta_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(META_DIR)
            .join(Self::shard(key))
            .join(format!("{key}.json"))
    }

    /// Shard directory for a key: its first two characters.
    fn shard(key: &str) -> &str {
        if key.len() >= 2 {
            &key[..2]
        } else {
            key
        }
    }
}
