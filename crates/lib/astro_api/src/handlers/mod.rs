//! Request handlers.

pub mod admin;
pub mod api_keys;
pub mod astrologers;
pub mod auth;
pub mod billing;
pub mod chat;
pub mod usage;
pub mod v1;
