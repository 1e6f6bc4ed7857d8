//! Random secret material and server-side key resolution.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::distr::Alphanumeric;
use rand::{Rng, RngCore, rng};
use tracing::info;

/// `n` bytes from the thread-local CSPRNG, base64url encoded without padding.
pub fn random_token(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Resolve a server secret: first non-empty env var in `env_vars`, then the
/// persisted file `<data_dir>/astro/<file_name>`, generating it on first use.
pub fn resolve_secret(env_vars: &[&str], file_name: &str) -> String {
    for var in env_vars {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    resolve_persisted_secret(&secret_dir().join(file_name))
}

/// Read the secret stored at `path`, or generate and persist a new one.
pub fn resolve_persisted_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, &secret);
    info!(path = %path.display(), "generated new server secret");
    secret
}

fn secret_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("astro")
}
