//! Request middleware: bearer auth, the API key gateway, and usage logging.

pub mod api_key;
pub mod auth;
pub mod quota;
pub mod usage_log;
