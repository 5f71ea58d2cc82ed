//! Startup checks for the admin credential.

use anyhow::{Result, bail};
use packyard_core::config::AdminConfig;

/// Normalize the configured admin token hash.
///
/// Accepts an optional `sha256:` prefix and any hex case, returning lowercase
/// hex to match `auth::hash_token`.
pub fn admin_token_hash(config: &AdminConfig) -> Result<String> {
    let hash = config
        .token_hash
        .trim()
        .strip_prefix("sha256:")
        .unwrap_or(config.token_hash.trim())
        .to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    Ok(hash)
}
