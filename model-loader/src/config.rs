//! Format classification.
//!
//! Maps a descriptor's packaging kind to a loading strategy and resolves the
//! paths and quantization level the session will be built with. Classification
//! is pure: it reads no files, so two classifications of the same descriptor
//! under the same policy are always value-equal.

use common::{ModelDescriptor, PackagingKind, QuantLevel, RequiredFile};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{LoadError, Result};
use crate::quant::QuantPolicy;

/// Settings file used as a chat template when a GGUF model names none.
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// How the session is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum LoadStrategy {
    /// Quantization baked into one file.
    SingleFile { file: PathBuf },
    /// Pre-quantized shards of one level, relative to the model directory.
    PreQuantized { shards: Vec<PathBuf> },
    /// Unquantized weights quantized in place after load.
    Adaptive { isq: QuantLevel },
    /// Resolved by the engine from a repository.
    Remote {
        repo: String,
        files: Vec<PathBuf>,
        isq: Option<QuantLevel>,
    },
}

/// Everything needed to construct one inference session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub model_id: String,
    pub kind: PackagingKind,
    pub strategy: LoadStrategy,
    /// Artifact directory (local mirror for remote models).
    pub model_dir: PathBuf,
    /// Manifest files resolved against `model_dir`.
    pub files: Vec<PathBuf>,
    /// Manifest as declared, rechecked before a local build.
    pub manifest: Vec<RequiredFile>,
    pub quant: Option<QuantLevel>,
    pub chat_template: Option<PathBuf>,
    /// Tokenizer repository used when no chat template file exists.
    pub tokenizer_repo: Option<String>,
    pub vision: bool,
}

/// Turns descriptors into session configurations.
#[derive(Debug, Clone)]
pub struct Classifier {
    models_dir: PathBuf,
    templates_dir: PathBuf,
    policy: QuantPolicy,
}

impl Classifier {
    pub fn new(
        models_dir: impl Into<PathBuf>,
        templates_dir: impl Into<PathBuf>,
        policy: QuantPolicy,
    ) -> Self {
        Self {
            models_dir: models_dir.into(),
            templates_dir: templates_dir.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &QuantPolicy {
        &self.policy
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Classify a descriptor into a [`SessionConfig`].
    ///
    /// # Errors
    /// `Classification` when the manifest cannot support the declared
    /// packaging kind (no GGUF file, no weight shards, no repository).
    pub fn classify(&self, descriptor: &ModelDescriptor) -> Result<SessionConfig> {
        let model_dir = self.models_dir.join(descriptor.local_dir_name());

        let (strategy, quant) = match descriptor.kind {
            PackagingKind::LocalSelfContainedQuantized => {
                let file = descriptor
                    .weight_shards()
                    .next()
                    .ok_or_else(|| classification(descriptor, "manifest declares no model file"))?;
                let quant = file.quant_level();
                (LoadStrategy::SingleFile { file: file.path.clone() }, quant)
            }
            PackagingKind::LocalMultiFileQuantizedText
            | PackagingKind::LocalMultiFileQuantizedVision => {
                let selection = self.policy.select_shards(descriptor)?;
                (LoadStrategy::PreQuantized { shards: selection.shards }, selection.level)
            }
            PackagingKind::LocalAdaptiveVision => {
                let isq = self.policy.adaptive;
                (LoadStrategy::Adaptive { isq }, Some(isq))
            }
            PackagingKind::RemoteHosted => {
                let repo = descriptor.repo.clone().ok_or_else(|| {
                    classification(descriptor, "remote model has no repository reference")
                })?;
                let files = descriptor.file_paths();
                // Explicit files are pre-quantized; a whole repository is quantized in place
                let (isq, quant) = if files.is_empty() {
                    (Some(self.policy.remote), Some(self.policy.remote))
                } else {
                    (None, descriptor.weight_shards().find_map(|f| f.quant_level()))
                };
                (LoadStrategy::Remote { repo, files, isq }, quant)
            }
        };

        Ok(SessionConfig {
            model_id: descriptor.id.clone(),
            kind: descriptor.kind,
            strategy,
            files: descriptor.files.iter().map(|f| model_dir.join(&f.path)).collect(),
            manifest: descriptor.files.clone(),
            quant,
            chat_template: self.resolve_chat_template(descriptor, &model_dir),
            tokenizer_repo: descriptor.tokenizer_repo.clone(),
            vision: descriptor.vision,
            model_dir,
        })
    }

    fn resolve_chat_template(
        &self,
        descriptor: &ModelDescriptor,
        model_dir: &Path,
    ) -> Option<PathBuf> {
        match &descriptor.chat_template {
            Some(template) if template.is_absolute() => Some(template.clone()),
            Some(template) => Some(self.templates_dir.join(template)),
            None if descriptor.kind == PackagingKind::LocalSelfContainedQuantized => {
                Some(model_dir.join(TOKENIZER_CONFIG_FILE))
            }
            None => None,
        }
    }
}

fn classification(descriptor: &ModelDescriptor, reason: &str) -> LoadError {
    LoadError::Classification {
        model_id: descriptor.id.clone(),
        reason: reason.to_string(),
    }
}
