//! ModelDesk command-line host.
//!
//! Wires the core crates together the way a desktop shell would: layered
//! configuration, credential lookup, structured logging, and the two
//! application entry points (`discover_models`, `chat`) behind subcommands.

pub mod config;
pub mod error;
pub mod host;
pub mod logging;

pub use config::{CliArgs, Command, GlobalArgs, ServerConfig, TokenAction};
pub use error::{ServerError, ServerResult};
