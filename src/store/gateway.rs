//! Object store gateway: durable ingestion and streamed retrieval.

use std::io;
use std::path::Path;

use mime_guess::mime::Mime;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use super::admission::StorageLimits;
use super::backend::{FsStore, OpenError};
use super::meta::{ObjectMeta, StoredObject};

/// Maximum accepted key length on retrieval.
const MAX_KEY_LENGTH: usize = 128;

/// Maximum characters kept from a filename extension.
const MAX_EXTENSION_LENGTH: usize = 10;

/// Errors during object ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The stream carried more bytes than the configured limit. The declared
    /// size is only an admission hint; this is the write-time bound.
    #[error("payload exceeded limit of {limit} bytes during write")]
    PayloadOverrun {
        /// Configured maximum.
        limit: u64,
    },

    /// The backend write failed. Not retried here; retry policy belongs to
    /// the caller.
    #[error("backend write error: {0}")]
    Backend(#[source] io::Error),
}

/// Errors during object retrieval.
#[derive(Error, Debug)]
pub enum RetrieveError {
    /// No object under the key. Expected, frequent traffic.
    #[error("object not found")]
    NotFound,

    /// A read that started successfully failed partway through the copy to
    /// the response. Never conflated with [`RetrieveError::NotFound`].
    #[error("object read failed mid-stream: {0}")]
    StreamCopy(#[source] io::Error),

    /// The backend failed before any bytes were produced.
    #[error("backend read error: {0}")]
    Backend(#[source] io::Error),
}

/// A successfully opened object, ready to stream.
///
/// The file handle is the only resource held; dropping it releases the
/// handle on every exit path, including an early client disconnect.
#[derive(Debug)]
pub struct RetrievedObject {
    /// Blob file handle positioned at offset 0.
    pub file: File,
    /// Content type recorded at ingestion.
    pub content_type: String,
    /// Original filename, when the metadata sidecar survives.
    pub filename: Option<String>,
    /// Recorded size in bytes, when the metadata sidecar survives.
    pub size_bytes: Option<u64>,
}

/// Gateway over the object backend.
///
/// Derives storage keys, resolves content types, streams payloads into the
/// backend under the write-time size bound, and opens objects for streamed
/// read-back.
#[derive(Debug, Clone)]
pub struct ObjectGateway {
    store: FsStore,
    limits: StorageLimits,
}

impl ObjectGateway {
    /// Create a gateway over the given store.
    pub fn new(store: FsStore, limits: StorageLimits) -> Self {
        Self { store, limits }
    }

    /// Limits this gateway enforces at write time.
    pub fn limits(&self) -> &StorageLimits {
        &self.limits
    }

    /// Ingest an object: derive a key, resolve the content type, and stream
    /// `content` into the backend without buffering it whole.
    ///
    /// The byte count is accumulated during the copy and checked against the
    /// limit, so a client that under-declared its size is still stopped. On
    /// any failure the pending write is discarded; no partial object becomes
    /// visible.
    pub async fn ingest(
        &self,
        owner_id: i64,
        filename: &str,
        declared_type: Option<&str>,
        content: impl AsyncRead + Unpin,
    ) -> Result<StoredObject, IngestError> {
        let key = derive_key(owner_id, filename);
        let content_type = resolve_content_type(declared_type, filename);
        let limit = self.limits.max_file_size_bytes;

        let mut pending = self.store.begin().await.map_err(IngestError::Backend)?;

        // Reading one byte past the limit is enough to detect an overrun
        // without copying an unbounded stream to disk. Dropping the pending
        // write on any early return discards the temp file.
        let mut bounded = content.take(limit.saturating_add(1));
        let written = tokio::io::copy(&mut bounded, pending.file_mut())
            .await
            .map_err(IngestError::Backend)?;

        if written > limit {
            return Err(IngestError::PayloadOverrun { limit });
        }

        let meta = ObjectMeta {
            content_type: content_type.clone(),
            size_bytes: written,
            owner_id,
            filename: filename.to_string(),
            uploaded_at: chrono::Utc::now(),
        };

        self.store
            .commit(pending, &key, &meta)
            .await
            .map_err(IngestError::Backend)?;

        Ok(StoredObject {
            key,
            content_type,
            size_bytes: written,
        })
    }

    /// Open the object under `key` for streamed reading.
    ///
    /// Keys that could never have been derived (traversal attempts, foreign
    /// characters) report as [`RetrieveError::NotFound`] without touching the
    /// backend.
    pub async fn retrieve(&self, key: &str) -> Result<RetrievedObject, RetrieveError> {
        if !valid_key(key) {
            return Err(RetrieveError::NotFound);
        }

        let (file, meta) = match self.store.open(key).await {
            Ok(pair) => pair,
            Err(OpenError::NotFound) => return Err(RetrieveError::NotFound),
            Err(OpenError::Io(e)) => return Err(RetrieveError::Backend(e)),
        };

        let (content_type, filename, size_bytes) = match meta {
            Some(m) => (m.content_type, Some(m.filename), Some(m.size_bytes)),
            // Sidecar lost: fall back to the key's extension.
            None => (
                mime_guess::from_path(key).first_or_octet_stream().to_string(),
                None,
                None,
            ),
        };

        Ok(RetrievedObject {
            file,
            content_type,
            filename,
            size_bytes,
        })
    }
}

/// Derive a storage key from the owner, filename and a fresh UUID.
///
/// The UUID carries the uniqueness, so concurrent uploads of the same name
/// never collide and deleted keys are never reused. The UUID leads so shard
/// directories spread over its hex prefix.
fn derive_key(owner_id: i64, filename: &str) -> String {
    format!(
        "{}-{}.{}",
        Uuid::new_v4(),
        owner_id,
        sanitize_extension(filename)
    )
}

/// Extract a storage-safe extension from a filename.
///
/// Keeps ASCII alphanumerics only, lowercased and truncated; anything else
/// degrades to "bin".
fn sanitize_extension(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let cleaned: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LENGTH)
        .collect::<String>()
        .to_lowercase();

    if cleaned.is_empty() {
        "bin".to_string()
    } else {
        cleaned
    }
}

/// Resolve a content type. Never fails: a well-formed declared MIME type
/// wins, then the filename extension, then the generic binary type.
fn resolve_content_type(declared: Option<&str>, filename: &str) -> String {
    if let Some(declared) = declared {
        if let Ok(mime) = declared.trim().parse::<Mime>() {
            return mime.to_string();
        }
    }

    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

/// Whether a retrieval key could have been produced by [`derive_key`].
fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && !key.starts_with('.')
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn setup_gateway(max_bytes: u64) -> (TempDir, ObjectGateway) {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path()).unwrap();
        let limits = StorageLimits {
            max_file_size_bytes: max_bytes,
        };
        (temp_dir, ObjectGateway::new(store, limits))
    }

    async fn read_all(file: &mut File) -> Vec<u8> {
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_ingest_and_retrieve_round_trip() {
        let (_temp_dir, gateway) = setup_gateway(1024 * 1024);
        let content = b"ten bytes!".to_vec();

        let object = gateway
            .ingest(1, "a.png", None, Cursor::new(content.clone()))
            .await
            .unwrap();

        assert_eq!(object.content_type, "image/png");
        assert_eq!(object.size_bytes, 10);
        assert!(object.key.ends_with(".png"));

        let mut retrieved = gateway.retrieve(&object.key).await.unwrap();
        assert_eq!(retrieved.content_type, "image/png");
        assert_eq!(retrieved.size_bytes, Some(10));
        assert_eq!(retrieved.filename.as_deref(), Some("a.png"));
        assert_eq!(read_all(&mut retrieved.file).await, content);
    }

    #[tokio::test]
    async fn test_ingest_same_filename_distinct_keys() {
        let (_temp_dir, gateway) = setup_gateway(1024);

        let first = gateway
            .ingest(1, "photo.jpg", None, Cursor::new(b"one".to_vec()))
            .await
            .unwrap();
        let second = gateway
            .ingest(1, "photo.jpg", None, Cursor::new(b"two".to_vec()))
            .await
            .unwrap();

        assert_ne!(first.key, second.key);

        let mut a = gateway.retrieve(&first.key).await.unwrap();
        let mut b = gateway.retrieve(&second.key).await.unwrap();
        assert_eq!(read_all(&mut a.file).await, b"one");
        assert_eq!(read_all(&mut b.file).await, b"two");
    }

    #[tokio::test]
    async fn test_concurrent_ingest_same_filename() {
        let (_temp_dir, gateway) = setup_gateway(1024);

        let (first, second) = tokio::join!(
            gateway.ingest(1, "photo.jpg", None, Cursor::new(b"left".to_vec())),
            gateway.ingest(1, "photo.jpg", None, Cursor::new(b"right".to_vec())),
        );

        let first = first.unwrap();
        let second = second.unwrap();
        assert_ne!(first.key, second.key);
        assert!(gateway.retrieve(&first.key).await.is_ok());
        assert!(gateway.retrieve(&second.key).await.is_ok());
    }

    #[tokio::test]
    async fn test_ingest_overrun_leaves_nothing_visible() {
        let (temp_dir, gateway) = setup_gateway(100);
        let content = vec![0xAB; 200];

        let result = gateway.ingest(1, "big.bin", None, Cursor::new(content)).await;

        assert!(matches!(
            result,
            Err(IngestError::PayloadOverrun { limit: 100 })
        ));

        // Neither a visible object nor a leftover temp file.
        let blobs = temp_dir.path().join("blobs");
        assert_eq!(std::fs::read_dir(&blobs).unwrap().count(), 0);
        let tmp = temp_dir.path().join("tmp");
        assert_eq!(std::fs::read_dir(&tmp).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_ingest_at_limit_succeeds() {
        let (_temp_dir, gateway) = setup_gateway(100);
        let content = vec![0xCD; 100];

        let object = gateway
            .ingest(1, "exact.bin", None, Cursor::new(content))
            .await
            .unwrap();
        assert_eq!(object.size_bytes, 100);
    }

    #[tokio::test]
    async fn test_recorded_size_is_actual_bytes() {
        let (_temp_dir, gateway) = setup_gateway(1024 * 1024);

        // The stream carries 800 bytes regardless of what a client declared.
        let object = gateway
            .ingest(1, "short.dat", None, Cursor::new(vec![0u8; 800]))
            .await
            .unwrap();
        assert_eq!(object.size_bytes, 800);

        let retrieved = gateway.retrieve(&object.key).await.unwrap();
        assert_eq!(retrieved.size_bytes, Some(800));
    }

    #[tokio::test]
    async fn test_ingest_empty_payload() {
        let (_temp_dir, gateway) = setup_gateway(1024);

        let object = gateway
            .ingest(1, "empty.png", None, Cursor::new(Vec::new()))
            .await
            .unwrap();
        assert_eq!(object.size_bytes, 0);

        let mut retrieved = gateway.retrieve(&object.key).await.unwrap();
        assert_eq!(read_all(&mut retrieved.file).await, Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_declared_type_wins_over_extension() {
        let (_temp_dir, gateway) = setup_gateway(1024);

        let object = gateway
            .ingest(1, "a.png", Some("image/webp"), Cursor::new(b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(object.content_type, "image/webp");

        let retrieved = gateway.retrieve(&object.key).await.unwrap();
        assert_eq!(retrieved.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_retrieve_not_found() {
        let (_temp_dir, gateway) = setup_gateway(1024);

        let result = gateway.retrieve("nonexistent-key").await;
        assert!(matches!(result, Err(RetrieveError::NotFound)));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_traversal_keys() {
        let (_temp_dir, gateway) = setup_gateway(1024);

        for key in ["../../etc/passwd", "..", "a/b.png", ".hidden", ""] {
            let result = gateway.retrieve(key).await;
            assert!(
                matches!(result, Err(RetrieveError::NotFound)),
                "key {key:?} should be not found"
            );
        }
    }

    #[test]
    fn test_derive_key_format() {
        let key = derive_key(42, "Photo.JPG");
        assert!(key.ends_with("-42.jpg"), "unexpected key: {key}");
        assert!(valid_key(&key));
        assert_ne!(derive_key(42, "Photo.JPG"), derive_key(42, "Photo.JPG"));
    }

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension("test.txt"), "txt");
        assert_eq!(sanitize_extension("image.PNG"), "png");
        assert_eq!(sanitize_extension("archive.tar.gz"), "gz");
        assert_eq!(sanitize_extension("no_extension"), "bin");
        assert_eq!(sanitize_extension(".hidden"), "bin");
        assert_eq!(sanitize_extension("weird.p?g"), "pg");
        assert_eq!(sanitize_extension("日本語ファイル.txt"), "txt");
    }

    #[test]
    fn test_resolve_content_type() {
        assert_eq!(resolve_content_type(None, "a.png"), "image/png");
        assert_eq!(resolve_content_type(Some("image/webp"), "a.png"), "image/webp");
        assert_eq!(resolve_content_type(Some("not a mime"), "a.png"), "image/png");
        assert_eq!(
            resolve_content_type(None, "noext"),
            "application/octet-stream"
        );
        assert_eq!(
            resolve_content_type(Some(""), "noext"),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_valid_key() {
        assert!(valid_key("550e8400-e29b-41d4-a716-446655440000-7.png"));
        assert!(!valid_key(""));
        assert!(!valid_key(".leading-dot"));
        assert!(!valid_key("has..dots"));
        assert!(!valid_key("has/slash"));
        assert!(!valid_key("日本語"));
        assert!(!valid_key(&"x".repeat(200)));
    }
}
