//! Data collaborators for the dimension engine: product catalogues answering
//! time distribution queries, catalogue backed domain providers, a domain
//! cache and dataset configuration files

pub mod cache;
pub mod config;
pub mod index;
pub mod providers;
pub mod sources;

use eo_core::DimensionError;
use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use cache::{CachedDomainProvider, DomainCache};
pub use config::{CatalogueCsvOptions, DatasetFile, DimensionEntry, LoadedDataset};
pub use index::TimeIndex;
pub use providers::ExtentDomainProvider;
pub use sources::{CatalogueEntry, ProductCatalogue};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Invalid catalogue row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}

impl From<DataError> for DimensionError {
    fn from(error: DataError) -> Self {
        DimensionError::TimeDistribution(error.to_string())
    }
}
