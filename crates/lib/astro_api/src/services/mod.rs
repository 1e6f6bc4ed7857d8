//! Orchestration services called by handlers.

pub mod auth;
pub mod cookies;
