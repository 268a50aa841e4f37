//! Command implementations behind the `modeldesk` binary.

use appstate::{AppState, HfAuthManager, ModelInfo};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::ChatError;
use modeldesk_model_cache::ModelRegistry;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Build the application state from merged configuration.
pub fn build_state(config: &ServerConfig, engine_logging: bool) -> ServerResult<AppState> {
    let registry = match &config.paths.catalog {
        Some(path) => ModelRegistry::builtin_with_catalog(path)?,
        None => ModelRegistry::builtin(),
    };
    info!("Registry loaded with {} models", registry.len());

    let token = HfAuthManager::new().resolve();
    let engine = modeldesk_model_loader::default_engine();

    Ok(AppState::new(
        registry,
        config.app_state_config(engine_logging),
        engine,
        token,
    ))
}

// ========== Formatting ==========

pub fn format_model_table(models: &[ModelInfo]) -> String {
    let id_width = models.iter().map(|m| m.id.len()).max().unwrap_or(2).max(2);
    let kind_width = models
        .iter()
        .map(|m| m.packaging_kind.as_str().len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<kind_width$}  {:<9}  {:<6}  NAME",
        "ID", "KIND", "AVAILABLE", "VISION"
    );
    for model in models {
        let available = if model.is_loaded {
            "loaded"
        } else if model.is_available {
            "yes"
        } else {
            "no"
        };
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<kind_width$}  {:<9}  {:<6}  {}",
            model.id,
            model.packaging_kind.as_str(),
            available,
            if model.is_vision { "yes" } else { "no" },
            model.name
        );
    }
    out
}

/// Availability details and load plan for one model.
pub async fn describe_model(state: &AppState, model_id: &str) -> ServerResult<String> {
    let models = state.discover_models().await;
    let model = models
        .iter()
        .find(|m| m.id == model_id)
        .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;

    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", model.name, model.id);
    if !model.description.is_empty() {
        let _ = writeln!(out, "  {}", model.description);
    }
    let _ = writeln!(out, "  kind:      {}", model.packaging_kind);
    if let Some(repo) = &model.repo {
        let _ = writeln!(out, "  repo:      {}", repo);
    }
    if let Some(size) = &model.size_estimate {
        let _ = writeln!(out, "  size:      {}", size);
    }
    let _ = writeln!(out, "  vision:    {}", model.is_vision);
    let _ = writeln!(out, "  available: {}", model.is_available);
    if !model.missing_files.is_empty() {
        let _ = writeln!(out, "  missing:   {}", model.missing_files.join(", "));
    }
    if let Some(error) = &model.scan_error {
        let _ = writeln!(out, "  scan error: {}", error);
    }

    match state.classify(model_id) {
        Ok(plan) => {
            let _ = writeln!(out, "  directory: {}", plan.model_dir.display());
            let _ = writeln!(out, "  plan:      {}", serde_json::to_string(&plan.strategy)?);
            let quant = plan.quant.map(|q| q.to_string()).unwrap_or_else(|| "baked-in".to_string());
            let _ = writeln!(out, "  quant:     {}", quant);
            if let Some(template) = &plan.chat_template {
                let _ = writeln!(out, "  template:  {}", template.display());
            }
        }
        Err(e) => {
            let _ = writeln!(out, "  plan:      unavailable ({})", e);
        }
    }
    Ok(out)
}

/// One-line rendering of a chat error for the terminal.
pub fn format_chat_error(err: &ChatError) -> String {
    let payload = err.to_payload();
    let hint = if payload.retryable { " (retryable)" } else { "" };
    format!("error [{}]: {}{}", payload.code, payload.message, hint)
}

// ========== Chat ==========

/// Read an image file and encode it for transport.
pub fn encode_image_file(path: &Path) -> ServerResult<String> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(ServerError::InvalidInput(format!("image file {:?} is empty", path)));
    }
    Ok(STANDARD.encode(bytes))
}

/// Run one chat turn, optionally bounded by `timeout`.
pub async fn chat_once(
    state: &AppState,
    model_id: &str,
    message: &str,
    image: Option<&str>,
    timeout: Option<Duration>,
) -> ServerResult<String> {
    let turn = state.chat(message, model_id, image);
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, turn).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(model_id, "Chat turn timed out after {:?}", limit);
                Err(ServerError::Timeout { secs: limit.as_secs() })
            }
        },
        None => Ok(turn.await?),
    }
}

// ========== REPL ==========

const REPL_HELP: &str = "\
Commands:
  /model <id>    switch model
  /image <path>  attach an image to the next message
  /models        list models
  /help          show this help
  /quit          exit
";

/// Line-oriented chat loop. Chat errors are printed and the loop continues.
pub async fn run_repl<R, W>(
    state: &AppState,
    model_id: &str,
    input: R,
    mut output: W,
    timeout: Option<Duration>,
) -> ServerResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut model_id = model_id.to_string();
    let mut pending_image: Option<String> = None;
    let mut lines = input.lines();

    output
        .write_all(format!("Chatting with {} (/help for commands)\n", model_id).as_bytes())
        .await?;

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => REPL_HELP.to_string(),
            ("/models", _) => format_model_table(&state.discover_models().await),
            ("/model", id) if !id.trim().is_empty() => {
                let id = id.trim();
                if state.registry().contains(id) {
                    model_id = id.to_string();
                    format!("Switched to {}\n", model_id)
                } else {
                    format!("{}\n", format_chat_error(&ChatError::UnknownModel(id.to_string())))
                }
            }
            ("/image", path) if !path.trim().is_empty() => {
                match encode_image_file(Path::new(path.trim())) {
                    Ok(encoded) => {
                        pending_image = Some(encoded);
                        "Image attached to the next message\n".to_string()
                    }
                    Err(e) => format!("error: {}\n", e),
                }
            }
            (command, _) if command.starts_with('/') => {
                format!("Unknown command {}\n{}", command, REPL_HELP)
            }
            _ => {
                let image = pending_image.take();
                match chat_once(state, &model_id, line, image.as_deref(), timeout).await {
                    Ok(text) => format!("{}\n", text),
                    Err(ServerError::Chat(e)) => format!("{}\n", format_chat_error(&e)),
                    Err(e) => format!("error: {}\n", e),
                }
            }
        };

        output.write_all(reply.as_bytes()).await?;
    }

    output.flush().await?;
    Ok(())
}
