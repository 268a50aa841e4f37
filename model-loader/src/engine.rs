//! Inference engine abstraction.
//!
//! The tensor-level engine is an external collaborator. This module defines
//! the builder-style configuration object handed to it and the two traits an
//! engine implements: [`InferenceEngine`] builds a [`LoadedModel`] from an
//! [`EngineBuilder`], and the loaded model answers chat requests.

use async_trait::async_trait;
use common::{ChatRole, QuantLevel};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Access token that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// Which engine-side builder to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderKind {
    /// Single-file GGUF load. `source` is a local directory or a repository.
    Gguf { source: String, files: Vec<String> },
    /// Pre-quantized UQFF text model; shards are relative to `source`.
    UqffText { source: String, shards: Vec<PathBuf> },
    /// Pre-quantized UQFF vision model.
    UqffVision { source: String, shards: Vec<PathBuf> },
    /// Plain text model (local directory or repository).
    Text { source: String },
    /// Plain vision model (local directory or repository).
    Vision { source: String },
}

impl BuilderKind {
    pub fn source(&self) -> &str {
        match self {
            BuilderKind::Gguf { source, .. }
            | BuilderKind::UqffText { source, .. }
            | BuilderKind::UqffVision { source, .. }
            | BuilderKind::Text { source }
            | BuilderKind::Vision { source } => source,
        }
    }

    pub fn is_vision(&self) -> bool {
        matches!(self, BuilderKind::UqffVision { .. } | BuilderKind::Vision { .. })
    }
}

/// Configuration object for one engine build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBuilder {
    pub kind: BuilderKind,
    pub isq: Option<QuantLevel>,
    pub chat_template: Option<PathBuf>,
    pub tok_model_id: Option<String>,
    pub token: Option<SecretToken>,
    pub logging: bool,
}

fn path_source(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl EngineBuilder {
    fn from_kind(kind: BuilderKind) -> Self {
        Self {
            kind,
            isq: None,
            chat_template: None,
            tok_model_id: None,
            token: None,
            logging: false,
        }
    }

    /// GGUF file(s) in a local directory.
    pub fn gguf(dir: impl AsRef<Path>, files: Vec<String>) -> Self {
        Self::from_kind(BuilderKind::Gguf { source: path_source(dir.as_ref()), files })
    }

    /// GGUF file(s) fetched from a repository.
    pub fn gguf_remote(repo: impl Into<String>, files: Vec<String>) -> Self {
        Self::from_kind(BuilderKind::Gguf { source: repo.into(), files })
    }

    pub fn uqff_text(dir: impl AsRef<Path>, shards: Vec<PathBuf>) -> Self {
        Self::from_kind(BuilderKind::UqffText { source: path_source(dir.as_ref()), shards })
    }

    pub fn uqff_vision(dir: impl AsRef<Path>, shards: Vec<PathBuf>) -> Self {
        Self::from_kind(BuilderKind::UqffVision { source: path_source(dir.as_ref()), shards })
    }

    pub fn text(source: impl Into<String>) -> Self {
        Self::from_kind(BuilderKind::Text { source: source.into() })
    }

    pub fn vision(source: impl Into<String>) -> Self {
        Self::from_kind(BuilderKind::Vision { source: source.into() })
    }

    /// Quantize in place after load.
    pub fn with_isq(mut self, level: QuantLevel) -> Self {
        self.isq = Some(level);
        self
    }

    pub fn with_chat_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.chat_template = Some(path.into());
        self
    }

    /// Fetch the tokenizer (and its chat template) from this repository.
    pub fn with_tok_model_id(mut self, repo: impl Into<String>) -> Self {
        self.tok_model_id = Some(repo.into());
        self
    }

    pub fn with_token(mut self, token: SecretToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }
}

/// One message of a chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Request handed to a loaded model. The image, if any, is already decoded.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub image: Option<image::DynamicImage>,
}

impl ChatRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_image(mut self, image: image::DynamicImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Text of the last user message.
    pub fn prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// A model resident in memory and ready to answer.
#[async_trait]
pub trait LoadedModel: Send + Sync {
    /// Generate a reply; the text is returned verbatim.
    async fn send_chat_request(&self, request: ChatRequest) -> anyhow::Result<String>;

    /// Whether overlapping requests are safe. Sessions serialize calls otherwise.
    fn supports_concurrent_requests(&self) -> bool {
        false
    }
}

/// Builds loaded models from builder configurations.
#[async_trait]
pub trait InferenceEngine: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Build a model. Engines that can abort a load should watch `cancel`;
    /// the caller drops the build future on cancellation either way.
    async fn build(
        &self,
        builder: EngineBuilder,
        cancel: CancellationToken,
    ) -> anyhow::Result<Box<dyn LoadedModel>>;
}

/// Engine used when no inference backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEngine;

#[async_trait]
impl InferenceEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn build(
        &self,
        _builder: EngineBuilder,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Box<dyn LoadedModel>> {
        anyhow::bail!("no inference backend compiled in (rebuild with the `mistralrs` feature)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_token_is_redacted() {
        let builder =
            EngineBuilder::text("owner/repo").with_token(SecretToken::new("hf_supersecret"));
        let debug = format!("{:?}", builder);
        assert!(!debug.contains("hf_supersecret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_prompt_is_last_user_message() {
        let request = ChatRequest::new()
            .with_message(ChatMessage::system("be brief"))
            .with_message(ChatMessage::user("first"))
            .with_message(ChatMessage::user("second"));
        assert_eq!(request.prompt(), Some("second"));
    }

    #[tokio::test]
    async fn test_unavailable_engine_fails_build() {
        let result = UnavailableEngine
            .build(EngineBuilder::text("owner/repo"), CancellationToken::new())
            .await;
        let err = result.err().expect("build must fail");
        assert!(err.to_string().contains("no inference backend"));
    }
}
