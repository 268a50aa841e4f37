//! `mistralrs` inference backend.

use anyhow::anyhow;
use async_trait::async_trait;
use common::{ChatRole, QuantLevel};
use mistralrs::{
    GgufModelBuilder, IsqType, Model, TextMessageRole, TextMessages, TextModelBuilder, TokenSource,
    UqffTextModelBuilder, UqffVisionModelBuilder, VisionMessages, VisionModelBuilder,
};
use tokio_util::sync::CancellationToken;

use crate::engine::{BuilderKind, ChatRequest, EngineBuilder, InferenceEngine, LoadedModel};

#[derive(Debug, Default, Clone, Copy)]
pub struct MistralRsEngine;

fn isq_type(level: QuantLevel) -> IsqType {
    match level {
        QuantLevel::Q4_0 => IsqType::Q4_0,
        QuantLevel::Q5_0 => IsqType::Q5_0,
        QuantLevel::Q8_0 => IsqType::Q8_0,
        QuantLevel::Q4K => IsqType::Q4K,
        QuantLevel::Q5K => IsqType::Q5K,
        QuantLevel::Q6K => IsqType::Q6K,
        QuantLevel::Q8K => IsqType::Q8K,
        QuantLevel::AFQ4 => IsqType::AFQ4,
        QuantLevel::AFQ8 => IsqType::AFQ8,
        QuantLevel::F8E4M3 => IsqType::F8E4M3,
    }
}

fn message_role(role: ChatRole) -> TextMessageRole {
    match role {
        ChatRole::System => TextMessageRole::System,
        ChatRole::User => TextMessageRole::User,
        ChatRole::Assistant => TextMessageRole::Assistant,
    }
}

fn token_source(builder: &EngineBuilder) -> Option<TokenSource> {
    builder
        .token
        .as_ref()
        .map(|t| TokenSource::Literal(t.expose().to_string()))
}

fn configure_text(mut b: TextModelBuilder, builder: &EngineBuilder) -> TextModelBuilder {
    if let Some(isq) = builder.isq {
        b = b.with_isq(isq_type(isq));
    }
    if let Some(template) = &builder.chat_template {
        b = b.with_chat_template(template.to_string_lossy());
    }
    if let Some(tok) = &builder.tok_model_id {
        b = b.with_tok_model_id(tok);
    }
    if let Some(source) = token_source(builder) {
        b = b.with_token_source(source);
    }
    if builder.logging {
        b = b.with_logging();
    }
    b
}

fn configure_vision(mut b: VisionModelBuilder, builder: &EngineBuilder) -> VisionModelBuilder {
    if let Some(isq) = builder.isq {
        b = b.with_isq(isq_type(isq));
    }
    if let Some(template) = &builder.chat_template {
        b = b.with_chat_template(template.to_string_lossy());
    }
    if let Some(source) = token_source(builder) {
        b = b.with_token_source(source);
    }
    if builder.logging {
        b = b.with_logging();
    }
    b
}

#[async_trait]
impl InferenceEngine for MistralRsEngine {
    fn name(&self) -> &str {
        "mistralrs"
    }

    async fn build(
        &self,
        builder: EngineBuilder,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Box<dyn LoadedModel>> {
        let vision = builder.kind.is_vision();
        let model = match &builder.kind {
            BuilderKind::Gguf { source, files } => {
                let mut b = GgufModelBuilder::new(source, files.clone());
                if let Some(template) = &builder.chat_template {
                    b = b.with_chat_template(template.to_string_lossy());
                }
                if let Some(tok) = &builder.tok_model_id {
                    b = b.with_tok_model_id(tok);
                }
                if let Some(source) = token_source(&builder) {
                    b = b.with_token_source(source);
                }
                if builder.logging {
                    b = b.with_logging();
                }
                b.build().await?
            }
            BuilderKind::UqffText { source, shards } => {
                let b = UqffTextModelBuilder::new(source, shards.clone()).into_inner();
                configure_text(b, &builder).build().await?
            }
            BuilderKind::UqffVision { source, shards } => {
                let b = UqffVisionModelBuilder::new(source, shards.clone()).into_inner();
                configure_vision(b, &builder).build().await?
            }
            BuilderKind::Text { source } => {
                configure_text(TextModelBuilder::new(source), &builder).build().await?
            }
            BuilderKind::Vision { source } => {
                configure_vision(VisionModelBuilder::new(source), &builder).build().await?
            }
        };

        Ok(Box::new(MistralRsModel { model, vision }))
    }
}

struct MistralRsModel {
    model: Model,
    vision: bool,
}

#[async_trait]
impl LoadedModel for MistralRsModel {
    async fn send_chat_request(&self, request: ChatRequest) -> anyhow::Result<String> {
        let ChatRequest { messages, image } = request;

        let response = match image {
            Some(image) if self.vision => {
                let mut vision_messages = VisionMessages::new();
                let mut prompt = String::new();
                for message in messages {
                    if message.role == ChatRole::User {
                        prompt = message.content;
                    } else {
                        vision_messages = vision_messages
                            .add_message(message_role(message.role), &message.content);
                    }
                }
                let vision_messages = vision_messages.add_image_message(
                    TextMessageRole::User,
                    &prompt,
                    vec![image],
                    &self.model,
                )?;
                self.model.send_chat_request(vision_messages).await?
            }
            Some(_) => return Err(anyhow!("model does not accept images")),
            None => {
                let mut text_messages = TextMessages::new();
                for message in &messages {
                    text_messages =
                        text_messages.add_message(message_role(message.role), &message.content);
                }
                self.model.send_chat_request(text_messages).await?
            }
        };

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No content in response"))
    }

    fn supports_concurrent_requests(&self) -> bool {
        true
    }
}
