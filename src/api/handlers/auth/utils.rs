//! Session token and browser key helpers.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use ulid::Ulid;

/// Create a new session token for the auth cookie.
/// The raw value is only returned to set the cookie; the registry keeps a hash.
pub(super) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

pub(super) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Key scoping a pending role selection to one browser.
pub(super) fn generate_browser_key() -> String {
    Ulid::new().to_string().to_lowercase()
}
