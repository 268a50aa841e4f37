//! Model descriptor data model.
//!
//! A [`ModelDescriptor`] is the immutable catalog entry for one model identity:
//! how it is packaged, where its artifacts live and which files make up a
//! complete artifact set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ========== PACKAGING KIND ==========

/// How a model's artifacts are packaged, which decides the loading strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackagingKind {
    /// One file with the quantization baked in (GGUF).
    LocalSelfContainedQuantized,
    /// Tokenizer, configs and pre-quantized weight shards for a text model.
    LocalMultiFileQuantizedText,
    /// Same as the text variant plus preprocessor configuration.
    LocalMultiFileQuantizedVision,
    /// Unquantized weights quantized in place after load.
    LocalAdaptiveVision,
    /// Fetched by the inference engine from a remote repository.
    RemoteHosted,
}

impl PackagingKind {
    pub const ALL: [PackagingKind; 5] = [
        PackagingKind::LocalSelfContainedQuantized,
        PackagingKind::LocalMultiFileQuantizedText,
        PackagingKind::LocalMultiFileQuantizedVision,
        PackagingKind::LocalAdaptiveVision,
        PackagingKind::RemoteHosted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackagingKind::LocalSelfContainedQuantized => "local-self-contained-quantized",
            PackagingKind::LocalMultiFileQuantizedText => "local-multi-file-quantized-text",
            PackagingKind::LocalMultiFileQuantizedVision => "local-multi-file-quantized-vision",
            PackagingKind::LocalAdaptiveVision => "local-adaptive-vision",
            PackagingKind::RemoteHosted => "remote-hosted",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PackagingKind::RemoteHosted)
    }

    /// Kinds that need a pre-quantized shard set resolved from the manifest.
    pub fn uses_prequantized_shards(&self) -> bool {
        matches!(
            self,
            PackagingKind::LocalMultiFileQuantizedText
                | PackagingKind::LocalMultiFileQuantizedVision
        )
    }
}

impl fmt::Display for PackagingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackagingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackagingKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown packaging kind: {}", s))
    }
}

// ========== QUANTIZATION LEVEL ==========

/// Quantization level of a weight shard or of an in-place quantization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuantLevel {
    #[serde(rename = "q4_0")]
    Q4_0,
    #[serde(rename = "q5_0")]
    Q5_0,
    #[serde(rename = "q8_0")]
    Q8_0,
    #[serde(rename = "q4k")]
    Q4K,
    #[serde(rename = "q5k")]
    Q5K,
    #[serde(rename = "q6k")]
    Q6K,
    #[serde(rename = "q8k")]
    Q8K,
    #[serde(rename = "afq4")]
    AFQ4,
    #[serde(rename = "afq8")]
    AFQ8,
    #[serde(rename = "f8e4m3")]
    F8E4M3,
}

impl QuantLevel {
    pub const ALL: [QuantLevel; 10] = [
        QuantLevel::Q4_0,
        QuantLevel::Q5_0,
        QuantLevel::Q8_0,
        QuantLevel::Q4K,
        QuantLevel::Q5K,
        QuantLevel::Q6K,
        QuantLevel::Q8K,
        QuantLevel::AFQ4,
        QuantLevel::AFQ8,
        QuantLevel::F8E4M3,
    ];

    /// Configuration name, also the token used in shard filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantLevel::Q4_0 => "q4_0",
            QuantLevel::Q5_0 => "q5_0",
            QuantLevel::Q8_0 => "q8_0",
            QuantLevel::Q4K => "q4k",
            QuantLevel::Q5K => "q5k",
            QuantLevel::Q6K => "q6k",
            QuantLevel::Q8K => "q8k",
            QuantLevel::AFQ4 => "afq4",
            QuantLevel::AFQ8 => "afq8",
            QuantLevel::F8E4M3 => "f8e4m3",
        }
    }

    /// Approximate bits per weight. Higher means closer to the unquantized model.
    pub fn rank(&self) -> u8 {
        match self {
            QuantLevel::Q4_0 | QuantLevel::Q4K | QuantLevel::AFQ4 => 4,
            QuantLevel::Q5_0 | QuantLevel::Q5K => 5,
            QuantLevel::Q6K => 6,
            QuantLevel::Q8_0 | QuantLevel::Q8K | QuantLevel::AFQ8 | QuantLevel::F8E4M3 => 8,
        }
    }

    /// Detect the quantization level encoded in a shard filename.
    ///
    /// Tokens are split on `-` and `.` and matched case-insensitively, so
    /// `llama3.2-vision-instruct-q5k.uqff` yields `Q5K`, `smollm33b-q8_0-0.uqff`
    /// yields `Q8_0` and GGUF names such as `model.Q4_K_M.gguf` yield `Q4K`.
    pub fn from_filename(name: &str) -> Option<QuantLevel> {
        let lower = name.to_ascii_lowercase();
        lower
            .split(['-', '.'])
            .rev()
            .find_map(Self::from_token)
    }

    fn from_token(token: &str) -> Option<QuantLevel> {
        if let Some(level) = QuantLevel::ALL.iter().copied().find(|l| l.as_str() == token) {
            return Some(level);
        }
        // GGUF k-quant naming: q4_k_m, q5_k_s, q6_k
        match token.split('_').collect::<Vec<_>>().as_slice() {
            ["q4", "k", ..] => Some(QuantLevel::Q4K),
            ["q5", "k", ..] => Some(QuantLevel::Q5K),
            ["q6", "k", ..] => Some(QuantLevel::Q6K),
            ["q8", "k", ..] => Some(QuantLevel::Q8K),
            _ => None,
        }
    }
}

impl fmt::Display for QuantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        QuantLevel::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == wanted)
            .ok_or_else(|| format!("Unknown quantization level: {}", s))
    }
}

// ========== REQUIRED FILES ==========

const WEIGHT_EXTENSIONS: &[&str] = &["gguf", "uqff", "safetensors", "bin"];
const TOKENIZER_FILES: &[&str] = &["tokenizer.json", "tokenizer.model"];

/// One entry of a descriptor's required-file manifest.
///
/// Critical files must exist AND be non-empty for the artifact set to count
/// as complete. Deserializes from either a bare path or a table with an
/// explicit `critical` flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RequiredFileSpec")]
pub struct RequiredFile {
    pub path: PathBuf,
    pub critical: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequiredFileSpec {
    Path(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        critical: Option<bool>,
    },
}

impl From<RequiredFileSpec> for RequiredFile {
    fn from(spec: RequiredFileSpec) -> Self {
        match spec {
            RequiredFileSpec::Path(path) => RequiredFile::new(path),
            RequiredFileSpec::Detailed { path, critical } => {
                let mut file = RequiredFile::new(path);
                if let Some(critical) = critical {
                    file.critical = critical;
                }
                file
            }
        }
    }
}

impl RequiredFile {
    /// Create a manifest entry, inferring criticality from the file name.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let critical =
            is_tokenizer_file(&path) || is_residual_weights(&path) || is_weight_shard(&path);
        Self { path, critical }
    }

    pub fn critical(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), critical: true }
    }

    pub fn optional_size(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), critical: false }
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    }

    pub fn display(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }

    pub fn is_weight_shard(&self) -> bool {
        is_weight_shard(&self.path)
    }

    /// Quantization level encoded in the file name, for weight shards only.
    pub fn quant_level(&self) -> Option<QuantLevel> {
        if self.is_weight_shard() {
            QuantLevel::from_filename(self.file_name())
        } else {
            None
        }
    }
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase())
}

fn is_tokenizer_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| TOKENIZER_FILES.iter().any(|t| n.eq_ignore_ascii_case(t)))
        .unwrap_or(false)
}

fn is_residual_weights(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_ascii_lowercase();
    name.starts_with("residual") && name.ends_with(".safetensors")
}

/// Weight-bearing file other than the residual tensors.
pub fn is_weight_shard(path: &Path) -> bool {
    match extension_lower(path) {
        Some(ext) => WEIGHT_EXTENSIONS.contains(&ext.as_str()) && !is_residual_weights(path),
        None => false,
    }
}

// ========== MODEL DESCRIPTOR ==========

/// Immutable catalog entry for one model identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique, stable identifier. The sole session cache key.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: PackagingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_estimate: Option<String>,
    /// Remote repository reference (`owner/name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Directory name under the artifact root, when it differs from the repo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default)]
    pub files: Vec<RequiredFile>,
    #[serde(default)]
    pub vision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_template: Option<PathBuf>,
    /// Tokenizer source used when no chat template file is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_repo: Option<String>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, kind: PackagingKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            kind,
            size_estimate: None,
            repo: None,
            directory: None,
            files: Vec::new(),
            vision: false,
            chat_template: None,
            tokenizer_repo: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_size_estimate(mut self, size: impl Into<String>) -> Self {
        self.size_estimate = Some(size.into());
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Replace the manifest, inferring criticality for each path.
    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files = files.into_iter().map(RequiredFile::new).collect();
        self
    }

    pub fn with_required_files(mut self, files: Vec<RequiredFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    pub fn with_chat_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.chat_template = Some(template.into());
        self
    }

    pub fn with_tokenizer_repo(mut self, repo: impl Into<String>) -> Self {
        self.tokenizer_repo = Some(repo.into());
        self
    }

    /// Directory name under the artifact root: `directory`, else `repo`, else `id`.
    pub fn local_dir_name(&self) -> &str {
        self.directory
            .as_deref()
            .or(self.repo.as_deref())
            .unwrap_or(&self.id)
    }

    /// Manifest entries that are weight shards, in manifest order.
    pub fn weight_shards(&self) -> impl Iterator<Item = &RequiredFile> {
        self.files.iter().filter(|f| f.is_weight_shard())
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}
