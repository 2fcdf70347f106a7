//! SSH key path resolution and validation.
//!
//! Provisioning of a scope needs a private key to reach the machines. The key
//! is checked before anything is written.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the operator's private SSH key
pub const PRIVATE_KEY_ENV: &str = "CLOUDTIGER_PRIVATE_SSH_KEY_PATH";

/// Errors raised before a run starts
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("The environment variable CLOUDTIGER_PRIVATE_SSH_KEY_PATH is not set")]
    KeyPathUnset,

    #[error("The provided private SSH key does not exist: {path}")]
    KeyNotFound { path: String },

    #[error("Private SSH key path is not a file: {path}")]
    NotAFile { path: String },

    #[error("Cannot determine home directory")]
    NoHomeDir,
}

fn get_home_dir() -> Result<PathBuf, PreconditionError> {
    env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| PreconditionError::NoHomeDir)
}

/// Expand a leading `~` to the user's home directory
pub fn resolve_key_path(path: &str) -> Result<PathBuf, PreconditionError> {
    if path == "~" {
        return get_home_dir();
    }
    match path.strip_prefix("~/") {
        Some(rest) => Ok(get_home_dir()?.join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}

/// Validate that a key file exists
pub fn validate_key_file(path: &Path) -> Result<(), PreconditionError> {
    if !path.exists() {
        return Err(PreconditionError::KeyNotFound {
            path: path.display().to_string(),
        });
    }
    if !path.is_file() {
        return Err(PreconditionError::NotAFile {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Resolve and validate a key given by path, or by the environment when `None`
pub fn check_private_key(path: Option<&str>) -> Result<PathBuf, PreconditionError> {
    let raw = match path {
        Some(p) => p.to_string(),
        None => env::var(PRIVATE_KEY_ENV).map_err(|_| PreconditionError::KeyPathUnset)?,
    };
    let resolved = resolve_key_path(&raw)?;
    validate_key_file(&resolved)?;
    log::info!("The private SSH key {} does exist, going forward", resolved.display());
    Ok(resolved)
}
