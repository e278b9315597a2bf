//! Shared building blocks for the sync check service: domain types,
//! collaborator traits, the error taxonomy and ambient utilities
//! (configuration, logging, metrics).

pub mod error;
pub mod traits;
pub mod types;
pub mod utils;

pub use error::{CacheError, NetworkError, Result, SyncCheckError};
