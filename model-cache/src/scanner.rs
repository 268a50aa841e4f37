//! Artifact scanner.
//!
//! Checks a descriptor's required-file manifest against the artifact root.
//! Only manifested paths are probed, so unrelated files in a model directory
//! never affect scan time. Results are computed fresh on every call.

use common::{ChatError, ModelDescriptor, RequiredFile};
use futures::future::join_all;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Availability of one descriptor's artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityStatus {
    pub model_id: String,
    pub is_available: bool,
    /// Required files that are absent, or critical files that are empty.
    pub missing: Vec<String>,
    /// Subset of `missing` that exists but has zero length.
    pub empty: Vec<String>,
    /// Available because a network credential is configured.
    pub via_credential: bool,
    /// Scan failure other than "not found", for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AvailabilityStatus {
    fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            is_available: false,
            missing: Vec::new(),
            empty: Vec::new(),
            via_credential: false,
            error: None,
        }
    }

    /// Incomplete local artifact set as a chat error, if any file is missing.
    pub fn to_error(&self) -> Option<ChatError> {
        if self.missing.is_empty() {
            return None;
        }
        Some(ChatError::IncompleteArtifactSet {
            model_id: self.model_id.clone(),
            missing: self.missing.clone(),
        })
    }
}

/// Scans model artifact directories under one root.
#[derive(Debug, Clone)]
pub struct ArtifactScanner {
    root: PathBuf,
    has_credential: bool,
}

impl ArtifactScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            has_credential: false,
        }
    }

    /// Whether a network credential is configured (presence only).
    pub fn with_credential(mut self, has_credential: bool) -> Self {
        self.has_credential = has_credential;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_credential(&self) -> bool {
        self.has_credential
    }

    /// Local directory holding a descriptor's artifacts.
    pub fn artifact_dir(&self, descriptor: &ModelDescriptor) -> PathBuf {
        self.root.join(descriptor.local_dir_name())
    }

    /// Compute the availability of one descriptor.
    ///
    /// Never fails: I/O problems are recorded in the returned status and
    /// make the descriptor unavailable.
    pub async fn scan(&self, descriptor: &ModelDescriptor) -> AvailabilityStatus {
        if descriptor.kind.is_remote() && self.has_credential {
            let mut status = AvailabilityStatus::new(&descriptor.id);
            status.is_available = true;
            status.via_credential = true;
            return status;
        }

        let dir = self.artifact_dir(descriptor);
        self.check_files(&descriptor.id, &dir, &descriptor.files).await
    }

    /// Check a manifest against one directory, ignoring credentials.
    ///
    /// An empty manifest is never available: there is nothing to load.
    pub async fn check_files(
        &self,
        model_id: &str,
        dir: &Path,
        files: &[RequiredFile],
    ) -> AvailabilityStatus {
        let mut status = AvailabilityStatus::new(model_id);
        if files.is_empty() {
            log::debug!("{}: no local manifest to check", model_id);
            return status;
        }

        for file in files {
            check_file(dir, file, &mut status).await;
        }

        status.is_available = status.missing.is_empty() && status.error.is_none();
        if !status.is_available {
            log::debug!("{} unavailable: missing [{}]", model_id, status.missing.join(", "));
        }
        status
    }

    /// Scan many descriptors concurrently, preserving input order.
    pub async fn scan_all(&self, descriptors: &[ModelDescriptor]) -> Vec<AvailabilityStatus> {
        let statuses = join_all(descriptors.iter().map(|d| self.scan(d))).await;
        let available = statuses.iter().filter(|s| s.is_available).count();
        log::info!(
            "Scanned {} models under {}: {} available",
            statuses.len(),
            self.root.display(),
            available
        );
        statuses
    }
}

async fn check_file(dir: &Path, file: &RequiredFile, status: &mut AvailabilityStatus) {
    let path = dir.join(&file.path);
    let name = file.display();

    match tokio::fs::metadata(&path).await {
        Ok(meta) if !meta.is_file() => status.missing.push(name),
        Ok(meta) if file.critical && meta.len() == 0 => {
            log::debug!("Critical file {} is empty", path.display());
            status.empty.push(name.clone());
            status.missing.push(name);
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => status.missing.push(name),
        Err(e) => {
            log::warn!("Failed to inspect {}: {}", path.display(), e);
            if status.error.is_none() {
                status.error = Some(format!("{}: {}", name, e));
            }
            status.missing.push(name);
        }
    }
}
