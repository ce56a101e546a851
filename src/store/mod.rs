//! Object ingestion and retrieval pipeline.
//!
//! Two pieces, used in sequence per request:
//! - the admission filter ([`admit`]), a pure check on transport metadata
//!   that runs before any storage I/O, and
//! - the [`ObjectGateway`], which derives keys, resolves content types, and
//!   performs the durable streaming write and read against the backend.

mod admission;
mod backend;
mod gateway;
mod meta;

pub use admission::{admit, AdmissionError, StorageLimits};
pub use backend::{FsStore, OpenError, PendingObject};
pub use gateway::{IngestError, ObjectGateway, RetrieveError, RetrievedObject};
pub use meta::{ObjectMeta, StoredObject};
