//! Model registry and artifact scanning.
//!
//! - [`ModelRegistry`]: immutable catalog of known models
//! - [`ArtifactScanner`]: checks each model's required files on disk

pub mod builtin;
pub mod catalog;
pub mod error;
pub mod scanner;

pub use catalog::{is_valid_repo_id, ModelRegistry};
pub use error::{CatalogError, Result};
pub use scanner::{ArtifactScanner, AvailabilityStatus};
