//! Application state for ModelDesk.
//!
//! # Architecture
//!
//! ```text
//! Front ends (modeldesk CLI, desktop shell)
//!          ↓
//!     appstate (this crate): AppState, ChatRouter, SessionCache
//!          ↓
//! model-loader (classification, session factory) → model-cache (registry, scanner)
//!          ↓
//!       common (descriptors, ChatError)
//! ```
//!
//! Dependencies flow one way; nothing below `appstate` knows about it.

pub mod cache;
pub mod hf_auth;
pub mod image_input;
pub mod router;
pub mod state;

pub use cache::{SessionCache, SessionHandle, SessionLoader, SlotStatus};
pub use hf_auth::HfAuthManager;
pub use image_input::decode_image;
pub use router::{ChatRouter, ChatSettings, ImagePolicy, DEFAULT_SYSTEM_PROMPT};
pub use state::{AppState, AppStateConfig, FactoryLoader, ModelInfo};
