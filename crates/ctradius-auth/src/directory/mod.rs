//! ChurchTools directory access
//!
//! Modules talk to the directory through the [`DirectoryClient`] trait so
//! tests can substitute an in-memory fake for the HTTP client.

mod churchtools;
mod extension;

pub use churchtools::ChurchToolsClient;
pub use extension::{DataCategory, DataValue, ExtensionData};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unexpected status {status} for {path}")]
    Status { status: u16, path: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid response for {path}: {message}")]
    InvalidResponse { path: String, message: String },
}

impl DirectoryError {
    pub fn invalid_response(path: &str, message: impl Into<String>) -> Self {
        DirectoryError::InvalidResponse {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Read-only access to the ChurchTools REST API
///
/// Paths are relative to the API root (e.g. `/persons`). Implementations
/// return the payload with the `data` envelope already removed.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, DirectoryError>;

    /// Fetch every page of a paginated collection
    async fn get_all_pages(&self, path: &str) -> Result<Vec<Value>, DirectoryError>;
}
