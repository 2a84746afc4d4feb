//! Error types for the tour facade
//!
//! Lower layers keep their own error enums; the facade folds them into
//! [`Error`] so a front end can tell an empty album or a cancelled fetch
//! apart from a real failure.

use crate::catalog::CatalogError;
use crate::model::ModelError;
use crate::store::StoreError;
use crate::transport::TransportError;
use thiserror::Error;

/// Facade error type
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any persistence or network call
    #[error("Invalid input: {0}")]
    Validation(#[from] ModelError),

    #[error("Catalog error: {0}")]
    Catalog(CatalogError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Work abandoned because pending requests were cancelled
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Common error: {0}")]
    Common(#[from] vtour_common::Error),
}

impl Error {
    /// The catalog had nothing usable for this location
    pub fn is_empty_album(&self) -> bool {
        matches!(
            self,
            Error::Catalog(CatalogError::EmptyResult | CatalogError::MalformedResponse(_))
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Transport(TransportError::Cancelled) => Error::Cancelled,
            other => Error::Catalog(other),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Stale => Error::Cancelled,
            StoreError::MarkerNotFound(id) => Error::NotFound(format!("marker {}", id)),
            StoreError::PhotoNotFound(id) => Error::NotFound(format!("photo {}", id)),
            other => Error::Store(other),
        }
    }
}

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, Error>;
