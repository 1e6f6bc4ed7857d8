//! # astro_core
//!
//! Core domain logic for Astro: credentials and sessions, API keys and quotas,
//! astrologer availability, chat session lifecycle, and ledger settlement.

pub mod auth;
pub mod billing;
pub mod chat;
mod locks;
pub mod marketplace;
pub mod migrate;
pub mod models;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
