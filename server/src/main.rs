//! `modeldesk` - discover models and chat with them from the terminal.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{error, info};

use appstate::HfAuthManager;
use modeldesk_server::config::{CliArgs, Command, ServerConfig, TokenAction};
use modeldesk_server::error::{ServerError, ServerResult};
use modeldesk_server::{host, logging};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    logging::init(args.global.log_level.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match &e {
                ServerError::Chat(chat) => eprintln!("{}", host::format_chat_error(chat)),
                other => eprintln!("error: {}", other),
            }
            error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(args: CliArgs) -> ServerResult<()> {
    if let Command::Token { action } = &args.command {
        return run_token(action);
    }

    info!("Starting ModelDesk v{}", env!("CARGO_PKG_VERSION"));
    let config = ServerConfig::load(&args.global).map_err(ServerError::Config)?;
    let state = host::build_state(&config, args.global.engine_logging)?;
    let timeout = args.global.timeout_secs.map(Duration::from_secs);

    let result = match args.command {
        Command::List { json } => {
            let models = state.discover_models().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                print!("{}", host::format_model_table(&models));
            }
            Ok(())
        }
        Command::Info { model_id } => {
            print!("{}", host::describe_model(&state, &model_id).await?);
            Ok(())
        }
        Command::Chat { model_id, message, image } => {
            let image = image.as_deref().map(host::encode_image_file).transpose()?;
            let reply =
                host::chat_once(&state, &model_id, &message, image.as_deref(), timeout).await?;
            println!("{}", reply);
            Ok(())
        }
        Command::Repl { model_id } => {
            let stdin = BufReader::new(tokio::io::stdin());
            host::run_repl(&state, &model_id, stdin, tokio::io::stdout(), timeout).await
        }
        Command::Token { .. } => Ok(()),
    };

    state.shutdown().await;
    result
}

fn run_token(action: &TokenAction) -> ServerResult<()> {
    let auth = HfAuthManager::new();
    match action {
        TokenAction::Set { token } => {
            auth.set_token(token).map_err(ServerError::Auth)?;
            println!("✅ Token stored");
        }
        TokenAction::Clear => {
            auth.clear_token().map_err(ServerError::Auth)?;
            println!("Token cleared");
        }
        TokenAction::Status => {
            let source = if appstate::hf_auth::env_token().is_some() {
                "environment (HF_TOKEN)"
            } else if auth.has_token() {
                "stored"
            } else {
                "not configured"
            };
            println!("HuggingFace token: {}", source);
        }
    }
    Ok(())
}
