//! API handlers for the Web API.

pub mod image;

pub use image::*;

use crate::store::{ObjectGateway, StorageLimits};

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gateway over the object backend.
    pub gateway: ObjectGateway,
}

impl AppState {
    /// Create a new application state.
    pub fn new(gateway: ObjectGateway) -> Self {
        Self { gateway }
    }

    /// Limits consulted by upload admission.
    pub fn limits(&self) -> &StorageLimits {
        self.gateway.limits()
    }
}
