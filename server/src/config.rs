//! Configuration for the ModelDesk host.
//!
//! Supports:
//! - CLI arguments (highest priority)
//! - Environment variables (`MODELDESK_*`)
//! - TOML config file (`modeldesk.toml`)
//! - Defaults (lowest priority)

use anyhow::{Context, Result};
use appstate::{AppStateConfig, ChatSettings, ImagePolicy};
use clap::{Args, Parser, Subcommand, ValueEnum};
use modeldesk_model_loader::QuantPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Command-line arguments for the `modeldesk` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "modeldesk")]
#[command(about = "ModelDesk - discover local and remote models and chat with them")]
#[command(version)]
pub struct CliArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file path (defaults to the platform config directory)
    #[arg(long, short = 'c', global = true, env = "MODELDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding one subdirectory per local model
    #[arg(long, global = true, env = "MODELDESK_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Base directory for relative chat-template references
    #[arg(long, global = true, env = "MODELDESK_TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Extra TOML model catalog merged with the builtin models
    #[arg(long, global = true, env = "MODELDESK_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Number of sessions kept loaded at once
    #[arg(long, global = true, env = "MODELDESK_CACHE_SLOTS")]
    pub cache_slots: Option<usize>,

    /// Whether vision models require an image on every turn
    #[arg(long, global = true, value_enum, env = "MODELDESK_IMAGE_POLICY")]
    pub image_policy: Option<ImagePolicyArg>,

    /// Abort a chat turn after this many seconds
    #[arg(long, global = true, env = "MODELDESK_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Log filter, e.g. `debug` or `appstate=trace` (overrides RUST_LOG)
    #[arg(long, global = true, env = "MODELDESK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Let the inference engine log its own load progress
    #[arg(long, global = true, env = "MODELDESK_ENGINE_LOGGING")]
    pub engine_logging: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every known model with its availability
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show how a model would be loaded
    Info { model_id: String },
    /// Send one message and print the reply
    Chat {
        model_id: String,
        message: String,
        /// Image file to attach (vision models only)
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Interactive chat session
    Repl { model_id: String },
    /// Manage the stored HuggingFace token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TokenAction {
    /// Store a token (must start with `hf_`)
    Set { token: String },
    /// Remove the stored token
    Clear,
    /// Report whether a token is configured
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImagePolicyArg {
    Optional,
    Required,
}

impl From<ImagePolicyArg> for ImagePolicy {
    fn from(arg: ImagePolicyArg) -> Self {
        match arg {
            ImagePolicyArg::Optional => ImagePolicy::Optional,
            ImagePolicyArg::Required => ImagePolicy::Required,
        }
    }
}

/// Full configuration (merged from all sources).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub paths: PathsConfig,
    pub cache: CacheConfig,
    pub chat: ChatSettings,
    pub quantization: QuantPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Defaults to the first existing `models` directory, then the platform data directory.
    pub models_dir: Option<PathBuf>,
    /// Defaults to the parent of `models_dir`.
    pub templates_dir: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub slots: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { slots: 1 }
    }
}

impl ServerConfig {
    /// Load configuration from CLI args and an optional config file.
    ///
    /// Priority: CLI args > Environment > Config file > Defaults
    ///
    /// # Errors
    /// An explicitly named config file that is missing, or any config file
    /// that fails to parse.
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = common::platform::get_default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_args(args);
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ServerConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Override with CLI args and environment.
    pub fn apply_args(&mut self, args: &GlobalArgs) {
        if let Some(models_dir) = &args.models_dir {
            self.paths.models_dir = Some(models_dir.clone());
        }
        if let Some(templates_dir) = &args.templates_dir {
            self.paths.templates_dir = Some(templates_dir.clone());
        }
        if let Some(catalog) = &args.catalog {
            self.paths.catalog = Some(catalog.clone());
        }
        if let Some(slots) = args.cache_slots {
            self.cache.slots = slots;
        }
        if let Some(policy) = args.image_policy {
            self.chat.image_policy = policy.into();
        }
    }

    /// Resolve defaults into an [`AppStateConfig`].
    pub fn app_state_config(&self, engine_logging: bool) -> AppStateConfig {
        let models_dir = self
            .paths
            .models_dir
            .clone()
            .unwrap_or_else(common::platform::get_default_models_dir);

        let mut config = AppStateConfig::with_models_dir(models_dir);
        if let Some(templates_dir) = &self.paths.templates_dir {
            config.templates_dir = templates_dir.clone();
        }
        config.cache_slots = self.cache.slots.max(1);
        config.chat = self.chat.clone();
        config.quant = self.quantization.clone();
        config.engine_logging = engine_logging;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::QuantLevel;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.cache.slots, 1);
        assert_eq!(config.chat.image_policy, ImagePolicy::Optional);
        assert!(config.paths.models_dir.is_none());
    }

    #[test]
    fn test_parse_toml_sections() {
        let config: ServerConfig = toml::from_str(
            r#"
            [paths]
            models_dir = "/srv/models"

            [cache]
            slots = 2

            [chat]
            image_policy = "required"

            [quantization]
            preferred = ["q8_0", "q4k"]
            remote = "q4k"

            [quantization.overrides]
            local-smollm3-3b = "afq4"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.models_dir, Some(PathBuf::from("/srv/models")));
        assert_eq!(config.cache.slots, 2);
        assert_eq!(config.chat.image_policy, ImagePolicy::Required);
        // Unset keys keep their defaults
        assert!(config.chat.system_prompt.is_some());
        assert_eq!(config.quantization.preferred, vec![QuantLevel::Q8_0, QuantLevel::Q4K]);
        assert_eq!(config.quantization.remote, QuantLevel::Q4K);
        assert_eq!(config.quantization.adaptive, QuantLevel::Q4K);
        assert_eq!(config.quantization.overrides.get("local-smollm3-3b"), Some(&QuantLevel::AFQ4));
    }

    #[test]
    fn test_cli_args_override() {
        let mut config = ServerConfig::default();
        config.paths.models_dir = Some(PathBuf::from("/from/file"));

        let args = GlobalArgs {
            models_dir: Some(PathBuf::from("/from/cli")),
            cache_slots: Some(3),
            image_policy: Some(ImagePolicyArg::Required),
            ..Default::default()
        };
        config.apply_args(&args);

        assert_eq!(config.paths.models_dir, Some(PathBuf::from("/from/cli")));
        assert_eq!(config.cache.slots, 3);
        assert_eq!(config.chat.image_policy, ImagePolicy::Required);
    }

    #[test]
    fn test_app_state_config_defaults_templates_to_parent() {
        let mut config = ServerConfig::default();
        config.paths.models_dir = Some(PathBuf::from("/srv/app/models"));
        config.cache.slots = 0;

        let app = config.app_state_config(false);
        assert_eq!(app.templates_dir, PathBuf::from("/srv/app"));
        assert_eq!(app.cache_slots, 1);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let args = GlobalArgs {
            config: Some(PathBuf::from("/definitely/not/here/modeldesk.toml")),
            ..Default::default()
        };
        assert!(ServerConfig::load(&args).is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = CliArgs::parse_from([
            "modeldesk",
            "--cache-slots",
            "2",
            "chat",
            "local-mistral-gguf",
            "hello",
        ]);
        assert_eq!(args.global.cache_slots, Some(2));
        assert_eq!(
            args.command,
            Command::Chat {
                model_id: "local-mistral-gguf".to_string(),
                message: "hello".to_string(),
                image: None,
            }
        );

        let args = CliArgs::parse_from(["modeldesk", "token", "set", "hf_abc"]);
        assert_eq!(
            args.command,
            Command::Token { action: TokenAction::Set { token: "hf_abc".to_string() } }
        );
    }
}
