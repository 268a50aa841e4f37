//! Integration tests for session construction

use async_trait::async_trait;
use common::{ChatError, ModelDescriptor, PackagingKind, QuantLevel};
use modeldesk_model_loader::{
    BuilderKind, ChatMessage, ChatRequest, Classifier, EngineBuilder, InferenceEngine, LoadError,
    LoadedModel, QuantPolicy, SecretToken, SessionFactory,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Engine that records every builder it receives.
#[derive(Default)]
struct RecordingEngine {
    builders: Mutex<Vec<EngineBuilder>>,
    fail_with: Option<String>,
}

impl RecordingEngine {
    fn last(&self) -> EngineBuilder {
        self.builders.lock().unwrap().last().cloned().expect("no build recorded")
    }
}

#[async_trait]
impl InferenceEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    async fn build(
        &self,
        builder: EngineBuilder,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Box<dyn LoadedModel>> {
        self.builders.lock().unwrap().push(builder);
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }
        Ok(Box::new(EchoModel::default()))
    }
}

/// Echoes the prompt and tracks how many calls overlap.
#[derive(Default)]
struct EchoModel {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl LoadedModel for EchoModel {
    async fn send_chat_request(&self, request: ChatRequest) -> anyhow::Result<String> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("echo: {}", request.prompt().unwrap_or_default()))
    }
}

struct PendingEngine;

#[async_trait]
impl InferenceEngine for PendingEngine {
    fn name(&self) -> &str {
        "pending"
    }

    async fn build(
        &self,
        _builder: EngineBuilder,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Box<dyn LoadedModel>> {
        std::future::pending().await
    }
}

fn write_file(dir: &Path, name: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), b"data").unwrap();
}

struct Fixture {
    _tmp: TempDir,
    app_dir: PathBuf,
    models_dir: PathBuf,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp = TempDir::new().unwrap();
    let app_dir = tmp.path().to_path_buf();
    let models_dir = app_dir.join("models");
    std::fs::create_dir_all(&models_dir).unwrap();
    Fixture { _tmp: tmp, app_dir, models_dir }
}

fn factory(fx: &Fixture, engine: Arc<dyn InferenceEngine>) -> SessionFactory {
    let classifier = Classifier::new(&fx.models_dir, &fx.app_dir, QuantPolicy::default());
    SessionFactory::new(classifier, engine)
}

fn mistral_local() -> ModelDescriptor {
    ModelDescriptor::new("local-mistral-gguf", PackagingKind::LocalSelfContainedQuantized)
        .with_directory("mistral-gguf")
        .with_files(["mistral-7b-instruct-v0.1.Q4_K_M.gguf"])
        .with_chat_template("mistral.json")
}

fn mistral_remote() -> ModelDescriptor {
    ModelDescriptor::new("mistral-7b-remote", PackagingKind::RemoteHosted)
        .with_repo("TheBloke/Mistral-7B-Instruct-v0.1-GGUF")
        .with_files(["mistral-7b-instruct-v0.1.Q4_K_M.gguf"])
        .with_chat_template("mistral.json")
        .with_tokenizer_repo("mistralai/Mistral-7B-Instruct-v0.1")
}

#[tokio::test]
async fn test_local_gguf_uses_template_beside_models_dir() {
    let fx = fixture();
    write_file(&fx.models_dir.join("mistral-gguf"), "mistral-7b-instruct-v0.1.Q4_K_M.gguf");
    write_file(&fx.app_dir, "mistral.json");

    let engine = Arc::new(RecordingEngine::default());
    let factory = factory(&fx, engine.clone());
    let session = factory
        .build_descriptor(&mistral_local(), CancellationToken::new())
        .await
        .expect("build should succeed");
    assert_eq!(session.model_id(), "local-mistral-gguf");

    let builder = engine.last();
    match builder.kind {
        BuilderKind::Gguf { source, files } => {
            assert_eq!(PathBuf::from(source), fx.models_dir.join("mistral-gguf"));
            assert_eq!(files, vec!["mistral-7b-instruct-v0.1.Q4_K_M.gguf".to_string()]);
        }
        other => panic!("unexpected builder {:?}", other),
    }
    assert_eq!(builder.chat_template, Some(fx.app_dir.join("mistral.json")));
    assert!(builder.token.is_none());
}

#[tokio::test]
async fn test_template_falls_back_to_model_dir() {
    let fx = fixture();
    let model_dir = fx.models_dir.join("mistral-gguf");
    write_file(&model_dir, "mistral-7b-instruct-v0.1.Q4_K_M.gguf");
    write_file(&model_dir, "mistral.json");

    let engine = Arc::new(RecordingEngine::default());
    factory(&fx, engine.clone())
        .build_descriptor(&mistral_local(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(engine.last().chat_template, Some(model_dir.join("mistral.json")));
}

#[tokio::test]
async fn test_prequantized_vision_builder() {
    let fx = fixture();
    let dir = fx.models_dir.join("llama-vision");
    let descriptor =
        ModelDescriptor::new("local-llama-vision", PackagingKind::LocalMultiFileQuantizedVision)
            .with_directory("llama-vision")
            .with_files([
                "config.json",
                "tokenizer.json",
                "llama3.2-vision-instruct-q4k.uqff",
                "llama3.2-vision-instruct-q8_0.uqff",
            ])
            .with_vision(true);
    for file in &descriptor.files {
        write_file(&dir, file.file_name());
    }

    let engine = Arc::new(RecordingEngine::default());
    let session = factory(&fx, engine.clone())
        .build_descriptor(&descriptor, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(session.config().quant, Some(QuantLevel::Q8_0));

    match engine.last().kind {
        BuilderKind::UqffVision { shards, .. } => {
            assert_eq!(shards, vec![PathBuf::from("llama3.2-vision-instruct-q8_0.uqff")]);
        }
        other => panic!("unexpected builder {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_local_file_at_load_time() {
    let fx = fixture();
    let engine = Arc::new(RecordingEngine::default());
    let err = factory(&fx, engine.clone())
        .build_descriptor(&mistral_local(), CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        LoadError::IncompleteArtifactSet { missing, .. } => {
            assert_eq!(missing, vec!["mistral-7b-instruct-v0.1.Q4_K_M.gguf".to_string()]);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(engine.builders.lock().unwrap().is_empty(), "engine must not be invoked");
}

#[tokio::test]
async fn test_remote_without_credential_or_mirror() {
    let fx = fixture();
    let engine = Arc::new(RecordingEngine::default());
    let err = factory(&fx, engine.clone())
        .build_descriptor(&mistral_remote(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::CredentialMissing { .. }));

    let chat: ChatError = err.into();
    assert_eq!(chat.code(), "credential_missing");
}

#[tokio::test]
async fn test_remote_with_token_uses_repo_and_tokenizer() {
    let fx = fixture();
    let engine = Arc::new(RecordingEngine::default());
    factory(&fx, engine.clone())
        .with_token(Some(SecretToken::new("hf_test")))
        .build_descriptor(&mistral_remote(), CancellationToken::new())
        .await
        .unwrap();

    let builder = engine.last();
    assert_eq!(builder.kind.source(), "TheBloke/Mistral-7B-Instruct-v0.1-GGUF");
    assert_eq!(builder.token, Some(SecretToken::new("hf_test")));
    assert_eq!(builder.tok_model_id.as_deref(), Some("mistralai/Mistral-7B-Instruct-v0.1"));
    assert!(builder.chat_template.is_none());
}

#[tokio::test]
async fn test_remote_full_repo_gets_in_place_quantization() {
    let fx = fixture();
    let descriptor = ModelDescriptor::new("smollm3-remote", PackagingKind::RemoteHosted)
        .with_repo("HuggingFaceTB/SmolLM3-3B");
    let engine = Arc::new(RecordingEngine::default());
    factory(&fx, engine.clone())
        .with_token(Some(SecretToken::new("hf_test")))
        .build_descriptor(&descriptor, CancellationToken::new())
        .await
        .unwrap();

    let builder = engine.last();
    assert_eq!(builder.kind, BuilderKind::Text { source: "HuggingFaceTB/SmolLM3-3B".to_string() });
    assert_eq!(builder.isq, Some(QuantLevel::Q8_0));
}

#[tokio::test]
async fn test_remote_local_mirror_without_token() {
    let fx = fixture();
    write_file(
        &fx.models_dir.join("TheBloke/Mistral-7B-Instruct-v0.1-GGUF"),
        "mistral-7b-instruct-v0.1.Q4_K_M.gguf",
    );
    let engine = Arc::new(RecordingEngine::default());
    factory(&fx, engine.clone())
        .build_descriptor(&mistral_remote(), CancellationToken::new())
        .await
        .unwrap();

    let builder = engine.last();
    assert_eq!(
        PathBuf::from(builder.kind.source()),
        fx.models_dir.join("TheBloke/Mistral-7B-Instruct-v0.1-GGUF")
    );
    assert!(builder.token.is_none());
}

#[tokio::test]
async fn test_engine_failure_is_classified() {
    let fx = fixture();
    write_file(&fx.models_dir.join("mistral-gguf"), "mistral-7b-instruct-v0.1.Q4_K_M.gguf");
    let engine = Arc::new(RecordingEngine {
        fail_with: Some("out of memory".to_string()),
        ..Default::default()
    });

    let err = factory(&fx, engine)
        .build_descriptor(&mistral_local(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Engine { .. }));

    let chat: ChatError = err.into();
    assert_eq!(chat.code(), "session_build_error");
    assert!(chat.to_string().contains("out of memory"));
}

#[tokio::test]
async fn test_cancel_aborts_pending_build() {
    let fx = fixture();
    write_file(&fx.models_dir.join("mistral-gguf"), "mistral-7b-instruct-v0.1.Q4_K_M.gguf");
    let factory = Arc::new(factory(&fx, Arc::new(PendingEngine)));
    let cancel = CancellationToken::new();

    let task = {
        let factory = factory.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { factory.build_descriptor(&mistral_local(), cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancelled build must finish")
        .unwrap();
    assert!(matches!(result, Err(LoadError::Cancelled { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_serializes_non_concurrent_model() {
    let fx = fixture();
    let descriptor = mistral_local();
    let config = factory(&fx, Arc::new(RecordingEngine::default())).classify(&descriptor).unwrap();

    let model = EchoModel::default();
    let max_active = model.max_active.clone();
    let session = Arc::new(modeldesk_model_loader::InferenceSession::new(
        config,
        Box::new(model),
        Duration::ZERO,
    ));
    assert!(session.is_serialized());

    let mut handles = Vec::new();
    for i in 0..4 {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            session
                .generate(ChatRequest::new().with_message(ChatMessage::user(format!("hi {}", i))))
                .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), format!("echo: hi {}", i));
    }
    assert_eq!(max_active.load(Ordering::SeqCst), 1, "calls must not overlap");
}
