use common::ChatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot classify model '{model_id}': {reason}")]
    Classification { model_id: String, reason: String },

    #[error("Model '{model_id}' is missing required files: {}", .missing.join(", "))]
    IncompleteArtifactSet { model_id: String, missing: Vec<String> },

    #[error("Model '{model_id}' needs HF_TOKEN and has no complete local copy")]
    CredentialMissing { model_id: String },

    #[error("Inference engine failed to build model '{model_id}': {source}")]
    Engine {
        model_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Loading of model '{model_id}' was cancelled")]
    Cancelled { model_id: String },
}

pub type Result<T> = std::result::Result<T, LoadError>;

impl From<LoadError> for ChatError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Classification { model_id, reason } => {
                ChatError::session_build(model_id, reason)
            }
            LoadError::IncompleteArtifactSet { model_id, missing } => {
                ChatError::IncompleteArtifactSet { model_id, missing }
            }
            LoadError::CredentialMissing { model_id } => ChatError::CredentialMissing { model_id },
            LoadError::Engine { model_id, source } => ChatError::session_build(model_id, source),
            LoadError::Cancelled { model_id } => ChatError::Cancelled { model_id },
        }
    }
}
