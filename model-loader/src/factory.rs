//! Session factory.
//!
//! Turns a [`SessionConfig`] into an [`EngineBuilder`], hands it to the
//! configured [`InferenceEngine`] and wraps the result in an
//! [`InferenceSession`]. Every failure comes back as a classified
//! [`LoadError`], never as a bare engine error.

use common::ModelDescriptor;
use modeldesk_model_cache::ArtifactScanner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{Classifier, LoadStrategy, SessionConfig};
use crate::engine::{EngineBuilder, InferenceEngine, SecretToken};
use crate::error::{LoadError, Result};
use crate::session::InferenceSession;

pub struct SessionFactory {
    classifier: Classifier,
    scanner: ArtifactScanner,
    engine: Arc<dyn InferenceEngine>,
    token: Option<SecretToken>,
    engine_logging: bool,
}

impl SessionFactory {
    pub fn new(classifier: Classifier, engine: Arc<dyn InferenceEngine>) -> Self {
        let scanner = ArtifactScanner::new(classifier.models_dir());
        Self {
            classifier,
            scanner,
            engine,
            token: None,
            engine_logging: false,
        }
    }

    /// Credential for remote repositories.
    pub fn with_token(mut self, token: Option<SecretToken>) -> Self {
        self.token = token;
        self
    }

    /// Ask the engine to log its own load progress.
    pub fn with_engine_logging(mut self, enabled: bool) -> Self {
        self.engine_logging = enabled;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn classify(&self, descriptor: &ModelDescriptor) -> Result<SessionConfig> {
        self.classifier.classify(descriptor)
    }

    /// Classify and build in one step.
    pub async fn build_descriptor(
        &self,
        descriptor: &ModelDescriptor,
        cancel: CancellationToken,
    ) -> Result<InferenceSession> {
        let config = self.classify(descriptor)?;
        self.build(&config, cancel).await
    }

    /// Build a session.
    ///
    /// # Errors
    /// - `IncompleteArtifactSet` if local files disappeared since discovery
    /// - `CredentialMissing` for a remote model without token or local mirror
    /// - `Engine` if the inference engine rejects the configuration
    /// - `Cancelled` if `cancel` fires before the engine finishes
    pub async fn build(
        &self,
        config: &SessionConfig,
        cancel: CancellationToken,
    ) -> Result<InferenceSession> {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled { model_id: config.model_id.clone() });
        }

        let builder = self.prepare(config).await?;
        log::info!(
            "Building session for {} ({}, quant {}) with {} engine",
            config.model_id,
            config.kind,
            config.quant.map(|q| q.to_string()).unwrap_or_else(|| "baked-in".to_string()),
            self.engine.name()
        );

        let started = Instant::now();
        let model = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Load of {} cancelled", config.model_id);
                return Err(LoadError::Cancelled { model_id: config.model_id.clone() });
            }
            result = self.engine.build(builder, cancel.clone()) => {
                result.map_err(|source| LoadError::Engine {
                    model_id: config.model_id.clone(),
                    source,
                })?
            }
        };

        let elapsed = started.elapsed();
        log::info!("✅ Model {} loaded in {:.1}s", config.model_id, elapsed.as_secs_f64());
        Ok(InferenceSession::new(config.clone(), model, elapsed))
    }

    /// Produce the engine builder for a configuration.
    pub async fn prepare(&self, config: &SessionConfig) -> Result<EngineBuilder> {
        let builder = match &config.strategy {
            LoadStrategy::SingleFile { file } => {
                self.require_local(config).await?;
                EngineBuilder::gguf(&config.model_dir, vec![path_string(file)])
            }
            LoadStrategy::PreQuantized { shards } => {
                self.require_local(config).await?;
                if config.vision {
                    EngineBuilder::uqff_vision(&config.model_dir, shards.clone())
                } else {
                    EngineBuilder::uqff_text(&config.model_dir, shards.clone())
                }
            }
            LoadStrategy::Adaptive { isq } => {
                self.require_local(config).await?;
                EngineBuilder::vision(path_string(&config.model_dir)).with_isq(*isq)
            }
            LoadStrategy::Remote { repo, files, isq } => {
                let mut builder = self.remote_builder(config, repo, files).await?;
                if let Some(isq) = isq {
                    builder = builder.with_isq(*isq);
                }
                builder
            }
        };

        let builder = self.apply_chat_template(builder, config).await;
        Ok(if self.engine_logging { builder.with_logging() } else { builder })
    }

    async fn remote_builder(
        &self,
        config: &SessionConfig,
        repo: &str,
        files: &[PathBuf],
    ) -> Result<EngineBuilder> {
        let names: Vec<String> = files.iter().map(|f| path_string(f)).collect();
        let is_gguf = files
            .iter()
            .any(|f| f.extension().map(|e| e.eq_ignore_ascii_case("gguf")).unwrap_or(false));

        if let Some(token) = &self.token {
            let builder = if is_gguf {
                EngineBuilder::gguf_remote(repo, names)
            } else if config.vision {
                EngineBuilder::vision(repo)
            } else {
                EngineBuilder::text(repo)
            };
            return Ok(builder.with_token(token.clone()));
        }

        // No credential: only a complete local mirror will do
        let mirrored = !config.manifest.is_empty()
            && self
                .scanner
                .check_files(&config.model_id, &config.model_dir, &config.manifest)
                .await
                .is_available;
        if !mirrored {
            return Err(LoadError::CredentialMissing { model_id: config.model_id.clone() });
        }

        log::info!("{}: no token configured, loading local mirror", config.model_id);
        Ok(if is_gguf {
            EngineBuilder::gguf(&config.model_dir, names)
        } else if config.vision {
            EngineBuilder::vision(path_string(&config.model_dir))
        } else {
            EngineBuilder::text(path_string(&config.model_dir))
        })
    }

    async fn require_local(&self, config: &SessionConfig) -> Result<()> {
        if config.manifest.is_empty() {
            return if is_dir(&config.model_dir).await {
                Ok(())
            } else {
                Err(LoadError::IncompleteArtifactSet {
                    model_id: config.model_id.clone(),
                    missing: vec![config.model_dir.display().to_string()],
                })
            };
        }

        let status = self
            .scanner
            .check_files(&config.model_id, &config.model_dir, &config.manifest)
            .await;
        if status.is_available {
            Ok(())
        } else {
            Err(LoadError::IncompleteArtifactSet {
                model_id: config.model_id.clone(),
                missing: status.missing,
            })
        }
    }

    /// Attach the first chat template that exists on disk, else the tokenizer repository.
    async fn apply_chat_template(
        &self,
        builder: EngineBuilder,
        config: &SessionConfig,
    ) -> EngineBuilder {
        let mut candidates = Vec::new();
        if let Some(template) = &config.chat_template {
            candidates.push(template.clone());
            if let Some(name) = template.file_name() {
                candidates.push(config.model_dir.join(name));
            }
        }

        for candidate in candidates {
            if is_file(&candidate).await {
                log::debug!("{}: using chat template {}", config.model_id, candidate.display());
                return builder.with_chat_template(candidate);
            }
        }

        if let Some(repo) = &config.tokenizer_repo {
            log::debug!(
                "{}: no chat template on disk, using tokenizer from {}",
                config.model_id,
                repo
            );
            return builder.with_tok_model_id(repo.clone());
        }

        if let Some(template) = &config.chat_template {
            log::warn!(
                "{}: chat template {} not found, using the engine default",
                config.model_id,
                template.display()
            );
        }
        builder
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}
