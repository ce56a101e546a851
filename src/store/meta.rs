//! Object metadata types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata record persisted alongside each object blob.
///
/// Written atomically with the blob at ingestion and immutable afterwards.
/// The recorded content type is what retrieval serves, so a declared MIME
/// type that disagrees with the filename extension survives the round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Resolved content type.
    pub content_type: String,
    /// Number of bytes actually written, not the client-declared size.
    pub size_bytes: u64,
    /// Owner who ingested the object.
    pub owner_id: i64,
    /// Original filename as supplied by the client.
    pub filename: String,
    /// Ingestion timestamp.
    pub uploaded_at: DateTime<Utc>,
}

/// Handle to a successfully ingested object, returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Derived storage key, unique within the store.
    pub key: String,
    /// Resolved content type.
    pub content_type: String,
    /// Number of bytes written to the backend.
    pub size_bytes: u64,
}
