use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Model descriptor has an empty identifier")]
    EmptyId,

    #[error("Duplicate model identifier: {0}")]
    DuplicateId(String),

    #[error("Invalid repository reference '{repo}' for model '{model_id}'")]
    InvalidRepo { model_id: String, repo: String },

    #[error("Path '{path}' of model '{model_id}' must stay inside the model directory")]
    PathEscape { model_id: String, path: PathBuf },

    #[error("Model '{model_id}' mixes weight shards with and without a quantization level")]
    MixedShardLevels { model_id: String },

    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
