//! Keyed hashing of refresh tokens.
//!
//! Refresh tokens are stored as `base64(HMAC-SHA256(key, token))`: deterministic,
//! so the session row can be found by point lookup, and useless without the
//! server-side key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::AuthError;

/// Minimum key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct RefreshTokenHasher {
    mac: HmacSha256,
}

impl RefreshTokenHasher {
    pub fn new(key: &[u8]) -> Result<Self, AuthError> {
        if key.len() < MIN_KEY_LEN {
            return Err(AuthError::Internal(format!(
                "refresh token hash key must be at least {MIN_KEY_LEN} bytes"
            )));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| AuthError::Internal(format!("hmac key: {e}")))?;
        Ok(Self { mac })
    }

    pub fn hash(&self, refresh_token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(refresh_token.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for RefreshTokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenHasher").finish_non_exhaustive()
    }
}
