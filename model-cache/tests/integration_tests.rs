//! Integration tests for the registry and the artifact scanner

use common::{ModelDescriptor, PackagingKind, RequiredFile};
use modeldesk_model_cache::{ArtifactScanner, ModelRegistry};
use std::path::Path;
use tempfile::TempDir;

fn create_test_dir() -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();
    TempDir::new().expect("Failed to create temp dir")
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn local_text_a() -> ModelDescriptor {
    ModelDescriptor::new("local-text-a", PackagingKind::LocalMultiFileQuantizedText)
        .with_files(["tok.json", "cfg.json", "weights.bin"])
}

#[tokio::test]
async fn test_missing_weights_reported_by_name() {
    let root = create_test_dir();
    let model_dir = root.path().join("local-text-a");
    write_file(&model_dir, "tok.json", b"{}");
    write_file(&model_dir, "cfg.json", b"{}");

    let scanner = ArtifactScanner::new(root.path());
    let status = scanner.scan(&local_text_a()).await;

    assert!(!status.is_available);
    assert_eq!(status.missing, vec!["weights.bin".to_string()]);
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_complete_set_is_available_and_deletion_is_noticed() {
    let root = create_test_dir();
    let model_dir = root.path().join("local-text-a");
    write_file(&model_dir, "tok.json", b"{}");
    write_file(&model_dir, "cfg.json", b"{}");
    write_file(&model_dir, "weights.bin", b"\x01\x02");

    let scanner = ArtifactScanner::new(root.path());
    let descriptor = local_text_a();
    assert!(scanner.scan(&descriptor).await.is_available);

    std::fs::remove_file(model_dir.join("cfg.json")).unwrap();
    let status = scanner.scan(&descriptor).await;
    assert!(!status.is_available, "scan results must not be cached");
    assert_eq!(status.missing, vec!["cfg.json".to_string()]);
}

#[tokio::test]
async fn test_empty_critical_file_is_unavailable() {
    let root = create_test_dir();
    let descriptor = ModelDescriptor::new("vision", PackagingKind::LocalAdaptiveVision)
        .with_files(["config.json", "tokenizer.json", "residual.safetensors"]);
    let model_dir = root.path().join("vision");
    write_file(&model_dir, "config.json", b"{}");
    write_file(&model_dir, "tokenizer.json", b"");
    write_file(&model_dir, "residual.safetensors", b"\x00");

    let status = ArtifactScanner::new(root.path()).scan(&descriptor).await;
    assert!(!status.is_available);
    assert_eq!(status.empty, vec!["tokenizer.json".to_string()]);
    assert_eq!(status.missing, vec!["tokenizer.json".to_string()]);
}

#[tokio::test]
async fn test_empty_non_critical_file_is_fine() {
    let root = create_test_dir();
    let descriptor = ModelDescriptor::new("m", PackagingKind::LocalSelfContainedQuantized)
        .with_required_files(vec![
            RequiredFile::optional_size("notes.txt"),
            RequiredFile::new("m.gguf"),
        ]);
    let model_dir = root.path().join("m");
    write_file(&model_dir, "notes.txt", b"");
    write_file(&model_dir, "m.gguf", b"GGUF");

    let status = ArtifactScanner::new(root.path()).scan(&descriptor).await;
    assert!(status.is_available);
}

#[tokio::test]
async fn test_directory_in_place_of_file_is_missing() {
    let root = create_test_dir();
    let descriptor = ModelDescriptor::new("m", PackagingKind::LocalSelfContainedQuantized)
        .with_files(["m.gguf"]);
    std::fs::create_dir_all(root.path().join("m").join("m.gguf")).unwrap();

    let status = ArtifactScanner::new(root.path()).scan(&descriptor).await;
    assert!(!status.is_available);
    assert_eq!(status.missing, vec!["m.gguf".to_string()]);
}

#[tokio::test]
async fn test_remote_availability_depends_on_credential_or_mirror() {
    let root = create_test_dir();
    let remote = ModelDescriptor::new("remote-model-x", PackagingKind::RemoteHosted)
        .with_repo("owner/model-x")
        .with_files(["model.gguf"]);

    let without = ArtifactScanner::new(root.path()).with_credential(false);
    let status = without.scan(&remote).await;
    assert!(!status.is_available);
    assert!(!status.via_credential);

    let with = ArtifactScanner::new(root.path()).with_credential(true);
    let status = with.scan(&remote).await;
    assert!(status.is_available);
    assert!(status.via_credential);
    assert!(status.missing.is_empty());

    // Local mirror keyed by repository reference
    write_file(&root.path().join("owner/model-x"), "model.gguf", b"GGUF");
    let status = without.scan(&remote).await;
    assert!(status.is_available);
    assert!(!status.via_credential);
}

#[tokio::test]
async fn test_remote_without_manifest_or_credential() {
    let root = create_test_dir();
    let remote = ModelDescriptor::new("smollm3-remote", PackagingKind::RemoteHosted)
        .with_repo("HuggingFaceTB/SmolLM3-3B");
    let status = ArtifactScanner::new(root.path()).scan(&remote).await;
    assert!(!status.is_available);
}

#[tokio::test]
async fn test_scan_all_preserves_order() {
    let root = create_test_dir();
    let registry = ModelRegistry::builtin();
    let scanner = ArtifactScanner::new(root.path());

    let statuses = scanner.scan_all(registry.list()).await;
    let ids: Vec<_> = statuses.iter().map(|s| s.model_id.as_str()).collect();
    let expected: Vec<_> = registry.ids().collect();
    assert_eq!(ids, expected);
    assert!(statuses.iter().all(|s| !s.is_available));
}

#[tokio::test]
async fn test_builtin_local_layout_matches_downloader() {
    let root = create_test_dir();
    let registry = ModelRegistry::builtin();
    let descriptor = registry.get("local-mistral-gguf").expect("builtin entry");
    write_file(
        &root.path().join("mistral-gguf"),
        "mistral-7b-instruct-v0.1.Q4_K_M.gguf",
        b"GGUF",
    );

    let status = ArtifactScanner::new(root.path()).scan(descriptor).await;
    assert!(status.is_available, "{:?}", status);
}

#[test]
fn test_catalog_file_extends_builtin() {
    let dir = create_test_dir();
    let catalog = dir.path().join("catalog.toml");
    std::fs::write(
        &catalog,
        r#"
[[models]]
id = "custom-gguf"
name = "Custom"
kind = "local-self-contained-quantized"
files = ["custom.Q5_K_M.gguf"]
"#,
    )
    .unwrap();

    let registry = ModelRegistry::builtin_with_catalog(&catalog).unwrap();
    assert_eq!(registry.len(), 7);
    assert!(registry.contains("custom-gguf"));

    let first = registry.list().to_vec();
    let again = ModelRegistry::builtin_with_catalog(&catalog).unwrap();
    assert_eq!(first, again.list().to_vec(), "listing must be stable");
}

#[test]
fn test_catalog_rejects_bad_repo() {
    let err = ModelRegistry::from_toml_str(
        r#"
[[models]]
id = "x"
name = "X"
kind = "remote-hosted"
repo = "../../etc"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("Invalid repository reference"));
}
