//! imagebox - an authenticated image object store accessed over HTTP.
//!
//! Clients upload binary image payloads under a Bearer-token identity and
//! retrieve them later by the stable key returned at upload time.

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod web;

pub use config::Config;
pub use error::{ImageboxError, Result};
pub use store::{
    admit, AdmissionError, FsStore, IngestError, ObjectGateway, RetrieveError, StorageLimits,
    StoredObject,
};
pub use web::{ApiError, WebServer};
