//! Chat error taxonomy.
//!
//! Every failure a chat turn can end with is one of these variants. Capability
//! and input errors are raised before any load is attempted; load and
//! inference errors carry the lower-level cause for diagnostics.
//!
//! `ChatError` is `Clone` so a single load outcome can be handed to every
//! caller waiting on the same in-flight load.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Owned error cause that can be shared between waiters.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Boxed error accepted by the constructors below.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where in the chat pipeline an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStage {
    /// Request rejected before any load was attempted.
    Validation,
    /// The model could not be loaded.
    Load,
    /// The model loaded but failed to answer.
    Inference,
}

#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model '{model_id}' is missing required files: {}", .missing.join(", "))]
    IncompleteArtifactSet { model_id: String, missing: Vec<String> },

    #[error("Model '{model_id}' does not accept {modality} input")]
    UnsupportedModality { model_id: String, modality: String },

    #[error("Missing required input: {0}")]
    MissingRequiredInput(String),

    #[error("Failed to decode image: {message}")]
    ImageDecodeError {
        message: String,
        #[source]
        source: Option<SharedError>,
    },

    #[error("Model '{model_id}' needs HF_TOKEN and has no complete local copy")]
    CredentialMissing { model_id: String },

    #[error("Failed to load model '{model_id}': {message}")]
    SessionBuildError {
        model_id: String,
        message: String,
        #[source]
        source: Option<SharedError>,
    },

    #[error("Model '{model_id}' failed to generate a response: {message}")]
    InferenceEngineError {
        model_id: String,
        message: String,
        #[source]
        source: Option<SharedError>,
    },

    #[error("Loading of model '{model_id}' was cancelled")]
    Cancelled { model_id: String },
}

impl ChatError {
    pub fn image_decode(err: impl Into<BoxError>) -> Self {
        let source: SharedError = Arc::from(err.into());
        ChatError::ImageDecodeError {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn session_build(model_id: impl Into<String>, err: impl Into<BoxError>) -> Self {
        let source: SharedError = Arc::from(err.into());
        ChatError::SessionBuildError {
            model_id: model_id.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn inference(model_id: impl Into<String>, err: impl Into<BoxError>) -> Self {
        let source: SharedError = Arc::from(err.into());
        ChatError::InferenceEngineError {
            model_id: model_id.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn cancelled(model_id: impl Into<String>) -> Self {
        ChatError::Cancelled { model_id: model_id.into() }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::UnknownModel(_) => "unknown_model",
            ChatError::IncompleteArtifactSet { .. } => "incomplete_artifact_set",
            ChatError::UnsupportedModality { .. } => "unsupported_modality",
            ChatError::MissingRequiredInput(_) => "missing_required_input",
            ChatError::ImageDecodeError { .. } => "image_decode_error",
            ChatError::CredentialMissing { .. } => "credential_missing",
            ChatError::SessionBuildError { .. } => "session_build_error",
            ChatError::InferenceEngineError { .. } => "inference_engine_error",
            ChatError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn stage(&self) -> ErrorStage {
        match self {
            ChatError::UnknownModel(_)
            | ChatError::UnsupportedModality { .. }
            | ChatError::MissingRequiredInput(_)
            | ChatError::ImageDecodeError { .. } => ErrorStage::Validation,
            ChatError::IncompleteArtifactSet { .. }
            | ChatError::CredentialMissing { .. }
            | ChatError::SessionBuildError { .. }
            | ChatError::Cancelled { .. } => ErrorStage::Load,
            ChatError::InferenceEngineError { .. } => ErrorStage::Inference,
        }
    }

    /// Whether repeating the same request may succeed without changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Cancelled { .. } | ChatError::CredentialMissing { .. })
    }

    pub fn model_id(&self) -> Option<&str> {
        match self {
            ChatError::UnknownModel(id) => Some(id),
            ChatError::IncompleteArtifactSet { model_id, .. }
            | ChatError::UnsupportedModality { model_id, .. }
            | ChatError::CredentialMissing { model_id }
            | ChatError::SessionBuildError { model_id, .. }
            | ChatError::InferenceEngineError { model_id, .. }
            | ChatError::Cancelled { model_id } => Some(model_id),
            ChatError::MissingRequiredInput(_) | ChatError::ImageDecodeError { .. } => None,
        }
    }

    /// Structured description rendered by the caller.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            stage: self.stage(),
            message: self.to_string(),
            model_id: self.model_id().map(str::to_string),
            retryable: self.is_retryable(),
        }
    }
}

/// Serializable error description for the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub stage: ErrorStage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = ChatError::UnknownModel("ghost".to_string());
        assert_eq!(err.to_string(), "Unknown model: ghost");

        let err = ChatError::IncompleteArtifactSet {
            model_id: "m".to_string(),
            missing: vec!["a.json".to_string(), "b.uqff".to_string()],
        };
        assert_eq!(err.to_string(), "Model 'm' is missing required files: a.json, b.uqff");
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = ChatError::session_build("m", io);
        assert!(err.to_string().contains("disk on fire"));
        assert!(err.source().is_some());

        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }

    #[test]
    fn test_stage_distinguishes_load_from_inference() {
        assert_eq!(ChatError::session_build("m", "boom").stage(), ErrorStage::Load);
        assert_eq!(ChatError::inference("m", "boom").stage(), ErrorStage::Inference);
        assert_eq!(
            ChatError::UnsupportedModality {
                model_id: "m".into(),
                modality: "image".into(),
            }
            .stage(),
            ErrorStage::Validation
        );
    }

    #[test]
    fn test_payload_json() {
        let payload = ChatError::CredentialMissing { model_id: "remote".into() }.to_payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["code"], "credential_missing");
        assert_eq!(json["stage"], "load");
        assert_eq!(json["model_id"], "remote");
        assert_eq!(json["retryable"], true);
    }
}
