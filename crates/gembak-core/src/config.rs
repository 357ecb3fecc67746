//! Credential and path resolution.
//!
//! Cloud credentials come from explicit flags first, then the environment.
//! The engine only needs the three opaque strings (key id, application
//! key, bucket) or a clear "not configured" signal.

use std::path::PathBuf;

use crate::error::{GembakError, Result};

pub const ENV_KEY_ID: &str = "GEMBAK_B2_KEY_ID";
pub const ENV_APP_KEY: &str = "GEMBAK_B2_APP_KEY";
pub const ENV_BUCKET: &str = "GEMBAK_B2_BUCKET";
pub const ENV_LOCK_FILE: &str = "GEMBAK_LOCK_FILE";

/// Opaque cloud credential triple.
#[derive(Debug, Clone)]
pub struct CloudCredentials {
    pub key_id: String,
    pub app_key: String,
    pub bucket: String,
}

/// Resolve credentials from explicit values falling back to the
/// environment. Returns `None` when any of the three is missing.
pub fn resolve_credentials(
    key_id: Option<&str>,
    app_key: Option<&str>,
    bucket: Option<&str>,
) -> Option<CloudCredentials> {
    let pick = |explicit: Option<&str>, env: &str| -> Option<String> {
        match explicit {
            Some(v) if !v.is_empty() => Some(v.to_string()),
            _ => std::env::var(env).ok().filter(|v| !v.is_empty()),
        }
    };

    Some(CloudCredentials {
        key_id: pick(key_id, ENV_KEY_ID)?,
        app_key: pick(app_key, ENV_APP_KEY)?,
        bucket: pick(bucket, ENV_BUCKET)?,
    })
}

/// Like [`resolve_credentials`] but an error when unconfigured: for
/// operations where the cloud is the only storage involved.
pub fn require_credentials(
    key_id: Option<&str>,
    app_key: Option<&str>,
    bucket: Option<&str>,
) -> Result<CloudCredentials> {
    resolve_credentials(key_id, app_key, bucket).ok_or_else(|| {
        GembakError::Config(format!(
            "cloud credentials not configured: pass --key-id/--app-key/--bucket \
             or set {ENV_KEY_ID}, {ENV_APP_KEY} and {ENV_BUCKET}"
        ))
    })
}

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        return home_dir().join(rest);
    }
    PathBuf::from(path)
}

fn home_dir() -> PathBuf {
    #[cfg(unix)]
    let var = "HOME";
    #[cfg(not(unix))]
    let var = "USERPROFILE";
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Lock file path: the well-known default, overridable through
/// `GEMBAK_LOCK_FILE` for sandboxed environments.
pub fn lock_path() -> PathBuf {
    std::env::var_os(ENV_LOCK_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(crate::lock::default_lock_path)
}

/// Default live configuration directory.
pub fn default_source_dir() -> PathBuf {
    home_dir().join(".gemini")
}

/// Default directory for archives and installed backups.
pub fn default_backup_dir() -> PathBuf {
    home_dir().join("gembak-backups")
}
