//! HuggingFace credential storage.
//!
//! Tokens are looked up in this order:
//! 1. `HF_TOKEN` environment variable (a `.env` file counts once loaded)
//! 2. OS credential store, when built with the `keyring` feature
//! 3. Token file under the platform config directory

use anyhow::{bail, Context, Result};
use modeldesk_model_loader::SecretToken;
use std::path::{Path, PathBuf};

pub const HF_TOKEN_ENV: &str = "HF_TOKEN";
const TOKEN_FILE_NAME: &str = ".hf_token";
const TOKEN_PREFIX: &str = "hf_";

#[cfg(feature = "keyring")]
const KEYRING_SERVICE: &str = "ModelDesk.HuggingFace";
#[cfg(feature = "keyring")]
const KEYRING_USER: &str = "default";

/// Stores and retrieves the HuggingFace API token.
pub struct HfAuthManager {
    fallback_path: Option<PathBuf>,
    #[cfg_attr(not(feature = "keyring"), allow(dead_code))]
    use_keyring: bool,
}

impl HfAuthManager {
    /// Manager over the OS credential store and the default token file.
    pub fn new() -> Self {
        Self {
            fallback_path: Some(common::platform::get_config_dir().join(TOKEN_FILE_NAME)),
            use_keyring: cfg!(feature = "keyring"),
        }
    }

    /// File-only manager rooted at `dir`.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            fallback_path: Some(dir.as_ref().join(TOKEN_FILE_NAME)),
            use_keyring: false,
        }
    }

    pub fn token_path(&self) -> Option<&Path> {
        self.fallback_path.as_deref()
    }

    /// Store a token. Rejects anything that does not look like a HF token.
    pub fn set_token(&self, token: &str) -> Result<()> {
        let token = token.trim();
        validate_token(token)?;

        #[cfg(feature = "keyring")]
        if self.use_keyring {
            match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
                Ok(entry) => {
                    entry
                        .set_password(token)
                        .context("Failed to store token in keyring")?;
                    tracing::info!("HF token stored in OS credential store");
                    return Ok(());
                }
                Err(e) => tracing::warn!("Keyring unavailable: {}, using file fallback", e),
            }
        }

        self.set_token_file(token)
    }

    /// Stored token, ignoring the environment.
    pub fn get_token(&self) -> Result<Option<String>> {
        #[cfg(feature = "keyring")]
        if self.use_keyring {
            match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
                Ok(entry) => match entry.get_password() {
                    Ok(token) => return Ok(Some(token)),
                    Err(keyring::Error::NoEntry) => {}
                    Err(e) => tracing::warn!("Keyring read failed: {}, trying file fallback", e),
                },
                Err(e) => tracing::warn!("Keyring unavailable: {}, using file fallback", e),
            }
        }

        self.get_token_file()
    }

    pub fn has_token(&self) -> bool {
        self.get_token().ok().flatten().is_some()
    }

    pub fn clear_token(&self) -> Result<()> {
        #[cfg(feature = "keyring")]
        if self.use_keyring {
            if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
                match entry.delete_credential() {
                    Ok(()) => tracing::info!("HF token cleared from keyring"),
                    Err(keyring::Error::NoEntry) => {}
                    Err(e) => tracing::warn!("Keyring delete failed: {}", e),
                }
            }
        }

        self.clear_token_file()
    }

    /// Effective token: the environment first, then storage.
    pub fn resolve(&self) -> Option<SecretToken> {
        if let Some(token) = env_token() {
            tracing::debug!("Using HF token from {}", HF_TOKEN_ENV);
            return Some(SecretToken::new(token));
        }

        match self.get_token() {
            Ok(Some(token)) if !token.is_empty() => Some(SecretToken::new(token)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to read stored HF token: {:#}", e);
                None
            }
        }
    }

    // ========== File Fallback Methods ==========

    fn set_token_file(&self, token: &str) -> Result<()> {
        let path = self.fallback_path.as_ref().context("No fallback path available")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        std::fs::write(path, token).context("Failed to write token to file")?;
        restrict_permissions(path)?;

        tracing::info!("HF token stored in file: {:?}", path);
        Ok(())
    }

    fn get_token_file(&self) -> Result<Option<String>> {
        let Some(path) = self.fallback_path.as_ref() else {
            return Ok(None);
        };

        if !path.exists() {
            return Ok(None);
        }

        let token = std::fs::read_to_string(path).context("Failed to read token from file")?;
        let token = token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    fn clear_token_file(&self) -> Result<()> {
        let Some(path) = self.fallback_path.as_ref() else {
            return Ok(());
        };

        if path.exists() {
            std::fs::remove_file(path).context("Failed to delete token file")?;
            tracing::info!("HF token file deleted");
        }

        Ok(())
    }
}

impl Default for HfAuthManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Token from `HF_TOKEN`, if set and non-empty.
pub fn env_token() -> Option<String> {
    std::env::var(HF_TOKEN_ENV)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        bail!("Token is empty");
    }
    if !token.starts_with(TOKEN_PREFIX) {
        bail!("Invalid token format (expected a token starting with '{}')", TOKEN_PREFIX);
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict token file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
