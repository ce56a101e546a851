//! DTOs for the Web API.

use serde::Serialize;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Successful upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Storage key for later retrieval.
    pub key: String,
    /// Content type the object was recorded with.
    pub content_type: String,
    /// Number of bytes stored.
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_shape() {
        let response = ApiResponse::new(UploadResponse {
            key: "abc.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 10,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"]["key"], "abc.png");
        assert_eq!(json["data"]["content_type"], "image/png");
        assert_eq!(json["data"]["size_bytes"], 10);
    }
}
