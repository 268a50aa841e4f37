//! Central application state.
//!
//! Wires the registry, scanner, session factory, session cache and chat
//! router together and exposes the two application entry points,
//! [`AppState::discover_models`] and [`AppState::chat`].

use async_trait::async_trait;
use common::{ChatError, ModelDescriptor, PackagingKind};
use modeldesk_model_cache::{ArtifactScanner, AvailabilityStatus, ModelRegistry};
use modeldesk_model_loader::{
    Classifier, InferenceEngine, InferenceSession, QuantPolicy, SecretToken, SessionConfig,
    SessionFactory,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::{SessionCache, SessionLoader, SlotStatus};
use crate::router::{ChatRouter, ChatSettings};

/// Configuration for AppState initialization.
#[derive(Debug, Clone)]
pub struct AppStateConfig {
    /// Artifact root; each local model lives in a subdirectory of it.
    pub models_dir: PathBuf,
    /// Base for relative chat-template references.
    pub templates_dir: PathBuf,
    pub cache_slots: usize,
    pub chat: ChatSettings,
    pub quant: QuantPolicy,
    /// Let the inference engine log its own load progress.
    pub engine_logging: bool,
}

impl AppStateConfig {
    /// Configuration rooted at `models_dir`, with templates looked up beside it.
    pub fn with_models_dir(models_dir: impl Into<PathBuf>) -> Self {
        let models_dir = models_dir.into();
        let templates_dir = default_templates_dir(&models_dir);
        Self {
            models_dir,
            templates_dir,
            cache_slots: 1,
            chat: ChatSettings::default(),
            quant: QuantPolicy::default(),
            engine_logging: false,
        }
    }
}

impl Default for AppStateConfig {
    /// Uses the platform default models directory.
    fn default() -> Self {
        Self::with_models_dir(common::platform::get_default_models_dir())
    }
}

/// Parent of the artifact root. A bare relative root such as `models` maps
/// to the current directory; a filesystem root maps to itself.
pub fn default_templates_dir(models_dir: &std::path::Path) -> PathBuf {
    match models_dir.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => models_dir.to_path_buf(),
    }
}

/// One `discover_models` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub packaging_kind: PackagingKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_estimate: Option<String>,
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub files: Vec<String>,
    pub is_vision: bool,
    pub missing_files: Vec<String>,
    pub is_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

impl ModelInfo {
    fn new(descriptor: &ModelDescriptor, status: AvailabilityStatus, is_loaded: bool) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            packaging_kind: descriptor.kind,
            size_estimate: descriptor.size_estimate.clone(),
            is_available: status.is_available,
            repo: descriptor.repo.clone(),
            files: descriptor.files.iter().map(|f| f.display()).collect(),
            is_vision: descriptor.vision,
            missing_files: status.missing,
            is_loaded,
            scan_error: status.error,
        }
    }
}

/// [`SessionLoader`] over the registry and session factory.
pub struct FactoryLoader {
    registry: Arc<ModelRegistry>,
    factory: Arc<SessionFactory>,
}

impl FactoryLoader {
    pub fn new(registry: Arc<ModelRegistry>, factory: Arc<SessionFactory>) -> Self {
        Self { registry, factory }
    }
}

#[async_trait]
impl SessionLoader for FactoryLoader {
    async fn load(
        &self,
        model_id: &str,
        cancel: CancellationToken,
    ) -> Result<InferenceSession, ChatError> {
        let descriptor = self
            .registry
            .get(model_id)
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;
        self.factory
            .build_descriptor(descriptor, cancel)
            .await
            .map_err(ChatError::from)
    }
}

/// Central application state.
///
/// Cheap to clone; every clone shares the same session cache.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ModelRegistry>,
    factory: Arc<SessionFactory>,
    scanner: ArtifactScanner,
    cache: SessionCache,
    router: ChatRouter,
}

impl AppState {
    /// Initialize application state.
    ///
    /// `token` is the HuggingFace credential used for remote models; only
    /// its presence affects discovery.
    pub fn new(
        registry: ModelRegistry,
        config: AppStateConfig,
        engine: Arc<dyn InferenceEngine>,
        token: Option<SecretToken>,
    ) -> Self {
        tracing::info!("Initializing AppState...");

        let registry = Arc::new(registry);
        let has_credential = token.is_some();

        let classifier = Classifier::new(
            &config.models_dir,
            &config.templates_dir,
            config.quant.clone(),
        );
        let factory = Arc::new(
            SessionFactory::new(classifier, engine)
                .with_token(token)
                .with_engine_logging(config.engine_logging),
        );
        let scanner = ArtifactScanner::new(&config.models_dir).with_credential(has_credential);

        let loader = Arc::new(FactoryLoader::new(registry.clone(), factory.clone()));
        let cache = SessionCache::with_capacity(loader, config.cache_slots);
        let router = ChatRouter::new(registry.clone(), cache.clone(), config.chat.clone());

        tracing::info!(
            "AppState ready: {} models, artifact root {:?}, {} engine, {} cache slot(s), \
             credential {}",
            registry.len(),
            config.models_dir,
            factory.engine_name(),
            cache.capacity(),
            if has_credential { "configured" } else { "absent" }
        );

        Self {
            registry,
            factory,
            scanner,
            cache,
            router,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn router(&self) -> &ChatRouter {
        &self.router
    }

    pub fn has_credential(&self) -> bool {
        self.factory.has_credential()
    }

    /// List every registered model with fresh availability, sorted by id.
    ///
    /// Never fails: scan problems mark the affected model unavailable.
    pub async fn discover_models(&self) -> Vec<ModelInfo> {
        let descriptors = self.registry.list();
        let statuses = self.scanner.scan_all(descriptors).await;

        descriptors
            .iter()
            .zip(statuses)
            .map(|(descriptor, status)| {
                let is_loaded = matches!(
                    self.cache.status(&descriptor.id),
                    Some(SlotStatus::Ready { .. })
                );
                ModelInfo::new(descriptor, status, is_loaded)
            })
            .collect()
    }

    /// Run one chat turn against `model_id`.
    ///
    /// `image_data` is base64, optionally as a `data:` URL.
    ///
    /// # Errors
    /// Any [`ChatError`]; see [`ChatError::to_payload`] for a serializable form.
    pub async fn chat(
        &self,
        message: &str,
        model_id: &str,
        image_data: Option<&str>,
    ) -> Result<String, ChatError> {
        self.router.route(model_id, message, image_data).await
    }

    /// Load configuration the factory would use for `model_id`.
    pub fn classify(&self, model_id: &str) -> Result<SessionConfig, ChatError> {
        let descriptor = self
            .registry
            .get(model_id)
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;
        self.factory.classify(descriptor).map_err(ChatError::from)
    }

    /// Release every loaded session.
    pub async fn shutdown(&self) {
        tracing::info!("Releasing loaded sessions...");
        self.cache.evict_all().await;
    }
}
