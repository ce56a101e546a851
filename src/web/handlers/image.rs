//! Image upload and retrieval handlers.

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap},
    response::Response,
    Json,
};
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::store::{admit, AdmissionError, IngestError, RetrieveError};
use crate::web::dto::{ApiResponse, UploadResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// Name of the multipart field carrying the payload.
const FILE_FIELD: &str = "file";

/// Fallback filename when the client supplies none.
const DEFAULT_FILENAME: &str = "upload.bin";

/// Generate a safe Content-Disposition header value for image responses.
///
/// Sanitizes the filename to prevent header injection and uses RFC 5987
/// encoding for non-ASCII filenames.
///
/// # Security
///
/// The function:
/// - Removes control characters (including CR, LF which could cause header injection)
/// - Escapes double quotes and backslashes
/// - Uses RFC 5987 filename* parameter for proper Unicode support
fn content_disposition_header(filename: &str) -> String {
    // Sanitize filename for the basic filename parameter (ASCII fallback)
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' => '_',
            '\\' => '_',
            _ => c,
        })
        .collect();

    // For ASCII-only filenames, use simple format
    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("inline; filename=\"{}\"", filename);
    }

    // Use RFC 5987 encoding for non-ASCII or special characters
    let encoded = urlencoding::encode(filename);

    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// Transport-declared request size, if the client sent one.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Log an admission refusal and map it to a client error.
fn admission_rejected(owner_id: i64, err: AdmissionError) -> ApiError {
    tracing::warn!(owner_id, error = %err, "upload rejected");

    match err {
        AdmissionError::MissingPayload => ApiError::bad_request("No file provided"),
        AdmissionError::PayloadTooLarge { limit, .. } => {
            ApiError::payload_too_large(format!("File too large (max {limit} bytes)"))
        }
    }
}

/// POST /api/images - Upload an image.
///
/// Request body: multipart/form-data with a "file" field. Requires a Bearer
/// token; the resolved owner id scopes the stored object.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    let owner_id = claims.sub;
    tracing::info!(owner_id, "image upload requested");

    // Admission runs on the transport-declared size before any payload bytes
    // are read; oversized requests cost no storage I/O.
    if let Some(declared) = content_length(&headers) {
        admit(Some(declared), state.limits()).map_err(|err| admission_rejected(owner_id, err))?;
    }

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!(owner_id, error = %e, "invalid multipart payload");
        ApiError::bad_request("Invalid multipart data")
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or(DEFAULT_FILENAME).to_string();
        let declared_type = field.content_type().map(|s| s.to_string());

        // Bridge the multipart field into the gateway without buffering it.
        let reader =
            StreamReader::new(field.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));

        return match state
            .gateway
            .ingest(owner_id, &filename, declared_type.as_deref(), reader)
            .await
        {
            Ok(object) => {
                tracing::info!(
                    owner_id,
                    key = %object.key,
                    size_bytes = object.size_bytes,
                    "image upload accepted"
                );
                Ok(Json(ApiResponse::new(UploadResponse {
                    key: object.key,
                    content_type: object.content_type,
                    size_bytes: object.size_bytes,
                })))
            }
            Err(err @ IngestError::PayloadOverrun { .. }) => {
                tracing::warn!(owner_id, filename = %filename, error = %err, "upload exceeded limit at write time");
                Err(ApiError::payload_too_large("File too large"))
            }
            Err(IngestError::Backend(e)) => {
                tracing::error!(owner_id, filename = %filename, error = %e, "image upload failed");
                Err(ApiError::internal("Failed to store image"))
            }
        };
    }

    // The request carried no file part at all.
    Err(admission_rejected(owner_id, AdmissionError::MissingPayload))
}

/// GET /api/images/{key} - Retrieve an image by its storage key.
///
/// Streams the object body; the backing file handle is released when the
/// response finishes or the client disconnects.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let retrieved = match state.gateway.retrieve(&key).await {
        Ok(r) => r,
        Err(RetrieveError::NotFound) => {
            // Expected traffic, not a fault.
            tracing::debug!(key = %key, "image not found");
            return Err(ApiError::not_found("Image not found"));
        }
        Err(err) => {
            tracing::error!(key = %key, error = %err, "failed to open image");
            return Err(ApiError::internal("Failed to read image"));
        }
    };

    // A read that fails after it started is a stream-copy fault, reported at
    // error severity; it must never look like a missing object.
    let log_key = key.clone();
    let stream = ReaderStream::new(retrieved.file).map_err(move |e| {
        let err = RetrieveError::StreamCopy(e);
        tracing::error!(key = %log_key, error = %err, "image stream failed mid-copy");
        err
    });

    let mut builder = Response::builder().header(header::CONTENT_TYPE, retrieved.content_type);
    if let Some(size) = retrieved.size_bytes {
        builder = builder.header(header::CONTENT_LENGTH, size);
    }
    if let Some(filename) = retrieved.filename.as_deref() {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(filename),
        );
    }

    builder.body(Body::from_stream(stream)).map_err(|e| {
        tracing::error!(key = %key, error = %e, "failed to build response");
        ApiError::internal("Failed to build response")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_content_disposition_header_simple_ascii() {
        let result = content_disposition_header("photo.png");
        assert_eq!(result, "inline; filename=\"photo.png\"");
    }

    #[test]
    fn test_content_disposition_header_with_spaces() {
        let result = content_disposition_header("my photo.png");
        assert_eq!(result, "inline; filename=\"my photo.png\"");
    }

    #[test]
    fn test_content_disposition_header_japanese() {
        let result = content_disposition_header("日本語ファイル.png");
        assert!(result.starts_with("inline; filename=\""));
        assert!(result.contains("filename*=UTF-8''"));
        assert!(result.contains("%E6%97%A5%E6%9C%AC%E8%AA%9E"));
    }

    #[test]
    fn test_content_disposition_header_double_quote() {
        let result = content_disposition_header("test\"file.png");
        assert!(result.contains("filename=\"test_file.png\""));
        assert!(result.contains("filename*=UTF-8''"));
        assert!(result.contains("%22"));
    }

    #[test]
    fn test_content_disposition_header_control_characters() {
        // Carriage return and line feed are header injection attempts
        let result = content_disposition_header("test\r\nX-Injected: bad.png");
        assert!(!result.contains('\r'));
        assert!(!result.contains('\n'));
        assert!(result.starts_with("inline; filename="));
    }

    #[test]
    fn test_content_length_present() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(content_length(&headers), Some(1234));
    }

    #[test]
    fn test_content_length_absent() {
        assert_eq!(content_length(&HeaderMap::new()), None);
    }

    #[test]
    fn test_content_length_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(content_length(&headers), None);
    }

    #[test]
    fn test_admission_rejected_mapping() {
        let err = admission_rejected(1, AdmissionError::MissingPayload);
        assert!(err.to_string().contains("No file provided"));

        let err = admission_rejected(
            1,
            AdmissionError::PayloadTooLarge {
                declared: 2000,
                limit: 1000,
            },
        );
        assert!(err.to_string().contains("1000"));
    }
}
