//! Platform-specific default locations.
//!
//! Model artifacts are looked up next to the working directory first (the
//! layout used while developing the desktop shell) and fall back to the
//! per-user data directory.

use std::path::{Path, PathBuf};

/// Application directory name under the platform data/config directories.
pub const APP_DIR_NAME: &str = "ModelDesk";

/// Relative model directories probed in order by [`find_models_dir`].
pub const MODELS_DIR_CANDIDATES: &[&str] = &["models", "../models", "src-tauri/models"];

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "modeldesk.toml";

/// Find the first existing models directory relative to `base`.
pub fn find_models_dir(base: &Path) -> Option<PathBuf> {
    MODELS_DIR_CANDIDATES
        .iter()
        .map(|candidate| base.join(candidate))
        .find(|path| path.is_dir())
}

/// Get the default models directory.
///
/// Returns the first existing candidate relative to the current directory,
/// otherwise the platform data directory:
/// - **Windows**: `%APPDATA%\ModelDesk\models\`
/// - **macOS**: `~/Library/Application Support/ModelDesk/models/`
/// - **Linux**: `~/.local/share/ModelDesk/models/`
pub fn get_default_models_dir() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_models_dir(&cwd).unwrap_or_else(|| data_dir().join("models"))
}

/// Per-user configuration directory (`~/.config/ModelDesk` on Linux).
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILE_NAME)
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
