//! Format classification and inference session construction.
//!
//! ```text
//! ModelDescriptor --classify--> SessionConfig --prepare--> EngineBuilder
//!                                                               |
//!                                                            engine
//!                                                               v
//!                                                       InferenceSession
//! ```
//!
//! # Features
//! - `mistralrs`: compile the [`MistralRsEngine`] backend. Without it, use
//!   [`default_engine`] to get an engine that fails every build with a
//!   descriptive error, which keeps discovery and request validation usable.

pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod quant;
pub mod session;

#[cfg(feature = "mistralrs")]
pub mod mistralrs_engine;

use std::sync::Arc;

pub use config::{Classifier, LoadStrategy, SessionConfig};
pub use engine::{
    BuilderKind, ChatMessage, ChatRequest, EngineBuilder, InferenceEngine, LoadedModel, SecretToken,
    UnavailableEngine,
};
pub use error::{LoadError, Result};
pub use factory::SessionFactory;
pub use quant::{QuantPolicy, ShardSelection};
pub use session::InferenceSession;

#[cfg(feature = "mistralrs")]
pub use mistralrs_engine::MistralRsEngine;

/// Engine compiled into this build.
pub fn default_engine() -> Arc<dyn InferenceEngine> {
    #[cfg(feature = "mistralrs")]
    {
        Arc::new(MistralRsEngine)
    }

    #[cfg(not(feature = "mistralrs"))]
    {
        Arc::new(UnavailableEngine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_name() {
        let engine = default_engine();
        #[cfg(feature = "mistralrs")]
        assert_eq!(engine.name(), "mistralrs");
        #[cfg(not(feature = "mistralrs"))]
        assert_eq!(engine.name(), "unavailable");
    }
}
