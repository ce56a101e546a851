//! Upload admission checks.
//!
//! Admission runs before any storage I/O: it sees only metadata the transport
//! already has (declared size, whether a file part exists at all) and never
//! touches the payload bytes.

use thiserror::Error;

/// Process-wide storage limits.
///
/// Built once at startup from configuration and passed into the admission
/// filter on every upload. Read-only after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    /// Maximum accepted payload size in bytes.
    pub max_file_size_bytes: u64,
}

/// Reasons an upload is refused before storage is touched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// The request carries no file part at all. A zero-length file is not
    /// missing; it is admitted and stored as an empty object.
    #[error("no file part in request")]
    MissingPayload,

    /// The transport-declared size exceeds the configured limit.
    #[error("declared size {declared} exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Size reported by the transport.
        declared: u64,
        /// Configured maximum.
        limit: u64,
    },
}

/// Check an upload against the limits using transport-supplied metadata only.
///
/// `declared_size` is `None` when the transport produced no file part.
/// The declared size is advisory; the gateway independently bounds the bytes
/// actually written, so a client that lies here is still caught at write
/// time.
pub fn admit(declared_size: Option<u64>, limits: &StorageLimits) -> Result<(), AdmissionError> {
    let declared = declared_size.ok_or(AdmissionError::MissingPayload)?;

    if declared > limits.max_file_size_bytes {
        return Err(AdmissionError::PayloadTooLarge {
            declared,
            limit: limits.max_file_size_bytes,
        });
    }

    Ok(())
}
