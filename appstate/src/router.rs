//! Chat router.
//!
//! Validates a chat turn against the target model's capabilities, decodes
//! any attached image, acquires the session and runs one generation. Every
//! check that can fail without loading a model runs before the session cache
//! is touched.

use common::{ChatError, ModelDescriptor};
use modeldesk_model_cache::ModelRegistry;
use modeldesk_model_loader::{ChatMessage, ChatRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::cache::SessionCache;
use crate::image_input::decode_image;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Keep your responses concise and friendly.";

/// What to do when a vision model receives no image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePolicy {
    /// Proceed text-only.
    #[default]
    Optional,
    /// Reject with `MissingRequiredInput`.
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub image_policy: ImagePolicy,
    /// Sent as a leading system message on text-only turns.
    pub system_prompt: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            image_policy: ImagePolicy::Optional,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ChatRouter {
    registry: Arc<ModelRegistry>,
    cache: SessionCache,
    settings: ChatSettings,
}

impl ChatRouter {
    pub fn new(registry: Arc<ModelRegistry>, cache: SessionCache, settings: ChatSettings) -> Self {
        Self { registry, cache, settings }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Route one chat turn and return the generated text verbatim.
    pub async fn route(
        &self,
        model_id: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<String, ChatError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("chat", %request_id, model_id);
        self.route_inner(model_id, text, image).instrument(span).await
    }

    async fn route_inner(
        &self,
        model_id: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<String, ChatError> {
        let descriptor = self
            .registry
            .get(model_id)
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;

        let image = image.filter(|data| !data.trim().is_empty());
        self.validate(descriptor, text, image.is_some())?;

        let decoded = image.map(decode_image).transpose()?;

        let handle = self.cache.acquire(model_id).await?;
        let request = self.build_request(text, decoded);

        debug!(has_image = request.image.is_some(), "Invoking session");
        let reply = handle.generate(request).await?;
        info!(chars = reply.len(), "Chat turn complete");
        Ok(reply)
    }

    /// Capability and input checks. Never touches the session cache.
    fn validate(
        &self,
        descriptor: &ModelDescriptor,
        text: &str,
        has_image: bool,
    ) -> Result<(), ChatError> {
        if has_image && !descriptor.vision {
            return Err(ChatError::UnsupportedModality {
                model_id: descriptor.id.clone(),
                modality: "image".to_string(),
            });
        }

        if descriptor.vision && !has_image && self.settings.image_policy == ImagePolicy::Required {
            return Err(ChatError::MissingRequiredInput(format!(
                "model '{}' requires an image",
                descriptor.id
            )));
        }

        if text.trim().is_empty() && !has_image {
            return Err(ChatError::MissingRequiredInput("message text is empty".to_string()));
        }

        Ok(())
    }

    fn build_request(&self, text: &str, image: Option<image::DynamicImage>) -> ChatRequest {
        let mut request = ChatRequest::new();
        match image {
            Some(image) => request = request.with_image(image),
            None => {
                if let Some(prompt) = &self.settings.system_prompt {
                    request = request.with_message(ChatMessage::system(prompt.clone()));
                }
            }
        }
        request.with_message(ChatMessage::user(text))
    }
}
