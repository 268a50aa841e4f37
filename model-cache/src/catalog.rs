//! Model registry: the read-only catalog of known model identities.
//!
//! The registry is constructed once at startup (builtin entries, optionally
//! extended by a deployment catalog file) and shared by reference. There is
//! no mutation path; changing the catalog means restarting with new contents.

use common::ModelDescriptor;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Component, Path};

use crate::builtin::builtin_descriptors;
use crate::error::{CatalogError, Result};

/// Immutable, identifier-sorted collection of model descriptors.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Catalog shipped with the application.
    pub fn builtin() -> Self {
        let mut models = builtin_descriptors();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Self { models }
    }

    /// Build a registry from explicit descriptors.
    ///
    /// # Errors
    /// Rejects empty or duplicate identifiers, malformed repository
    /// references and manifest paths that escape the model directory.
    pub fn from_descriptors(descriptors: Vec<ModelDescriptor>) -> Result<Self> {
        {
            let mut seen = HashSet::new();
            for descriptor in &descriptors {
                validate_descriptor(descriptor)?;
                if !seen.insert(descriptor.id.as_str()) {
                    return Err(CatalogError::DuplicateId(descriptor.id.clone()));
                }
            }
        }

        let mut models = descriptors;
        models.sort_by(|a, b| a.id.cmp(&b.id));
        log::info!("Model registry initialised with {} models", models.len());
        Ok(Self { models })
    }

    /// Parse a catalog of `[[models]]` tables.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_descriptors(file.models)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loading model catalog from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Builtin catalog extended with the entries of a catalog file.
    ///
    /// Entries in the file may not reuse builtin identifiers.
    pub fn builtin_with_catalog(path: impl AsRef<Path>) -> Result<Self> {
        let extra = Self::from_toml_file(path)?;
        let mut descriptors = builtin_descriptors();
        descriptors.extend(extra.models);
        Self::from_descriptors(descriptors)
    }

    /// All descriptors, sorted by identifier.
    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models
            .binary_search_by(|m| m.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.models[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn validate_descriptor(descriptor: &ModelDescriptor) -> Result<()> {
    if descriptor.id.trim().is_empty() {
        return Err(CatalogError::EmptyId);
    }

    for repo in [&descriptor.repo, &descriptor.tokenizer_repo].into_iter().flatten() {
        if !is_valid_repo_id(repo) {
            return Err(CatalogError::InvalidRepo {
                model_id: descriptor.id.clone(),
                repo: repo.clone(),
            });
        }
    }

    if let Some(directory) = &descriptor.directory {
        if !is_contained_path(Path::new(directory)) {
            return Err(CatalogError::PathEscape {
                model_id: descriptor.id.clone(),
                path: directory.into(),
            });
        }
    }

    for file in &descriptor.files {
        if !is_contained_path(&file.path) {
            return Err(CatalogError::PathEscape {
                model_id: descriptor.id.clone(),
                path: file.path.clone(),
            });
        }
    }

    // A pre-quantized set is selected by level, so every shard needs one
    if descriptor.kind.uses_prequantized_shards() {
        let labelled = descriptor.weight_shards().filter(|s| s.quant_level().is_some()).count();
        if labelled > 0 && labelled < descriptor.weight_shards().count() {
            return Err(CatalogError::MixedShardLevels {
                model_id: descriptor.id.clone(),
            });
        }
    }

    Ok(())
}

/// Check a repository reference is `owner/name` and safe to use as a path.
pub fn is_valid_repo_id(repo_id: &str) -> bool {
    let parts: Vec<&str> = repo_id.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return false;
    }

    // No path traversal
    if repo_id.contains("..") || repo_id.contains("//") {
        return false;
    }

    repo_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '/')
}

fn is_contained_path(path: &Path) -> bool {
    let mut components = path.components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}
