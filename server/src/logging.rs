//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = concat!(
    "modeldesk=info,modeldesk_server=info,appstate=info,",
    "modeldesk_model_cache=info,modeldesk_model_loader=info"
);

/// Pick the log filter: explicit level, then `RUST_LOG`, then the default.
pub fn env_filter(log_level: Option<&str>) -> EnvFilter {
    if let Some(directives) = log_level {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid log level {:?}: {}", directives, e),
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Logs go to stderr so replies on stdout stay clean;
/// `log` records from the library crates are forwarded into tracing.
pub fn init(log_level: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
