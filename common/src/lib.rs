//! Common types shared across the ModelDesk workspace crates.
//!
//! This crate sits at the bottom of the dependency hierarchy:
//! - Has NO dependencies on other workspace crates
//! - Defines the model descriptor data model used by the registry, the
//!   classifier and the chat router
//! - Defines the chat error taxonomy every layer converts into

pub mod errors;
pub mod models;
pub mod platform;

pub use errors::{BoxError, ChatError, ErrorPayload, ErrorStage, SharedError};
pub use models::{ModelDescriptor, PackagingKind, QuantLevel, RequiredFile};

/// Role of a message in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}
