//! API server configuration.

use astro_core::auth::google::GoogleSettings;
use astro_core::auth::jwt::JwtSettings;
use astro_core::auth::secrets::resolve_secret;
use axum_extra::extract::cookie::SameSite;

/// Refresh cookie settings.
#[derive(Clone, Debug)]
pub struct RefreshCookieSettings {
    pub name: String,
    pub same_site: SameSite,
}

impl RefreshCookieSettings {
    /// Browsers drop `SameSite=None` cookies that are not `Secure`.
    pub fn secure(&self) -> bool {
        self.same_site == SameSite::None
    }
}

impl Default for RefreshCookieSettings {
    fn default() -> Self {
        Self {
            name: "astro_refresh".into(),
            same_site: SameSite::None,
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Access-token signing and lifetimes.
    pub jwt: JwtSettings,
    /// HMAC key for refresh-token hashes.
    pub refresh_token_hash_key: String,
    pub refresh_cookie: RefreshCookieSettings,
    pub google: GoogleSettings,
    /// Currency used when a request does not name one.
    pub default_currency: String,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                   | Default                                       |
    /// |----------------------------|-----------------------------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:3100`                              |
    /// | `DATABASE_URL`             | `postgres://localhost:5432/astro`             |
    /// | `JWT_SECRET`               | generated & persisted to file                 |
    /// | `JWT_ISSUER`               | `astro-api`                                   |
    /// | `JWT_AUDIENCE`             | `astro-api`                                   |
    /// | `ACCESS_TOKEN_MINUTES`     | `15`                                          |
    /// | `REFRESH_TOKEN_DAYS`       | `14`                                          |
    /// | `REFRESH_TOKEN_HASH_KEY`   | generated & persisted to file                 |
    /// | `REFRESH_COOKIE_NAME`      | `astro_refresh`                               |
    /// | `REFRESH_COOKIE_SAME_SITE` | `none`                                        |
    /// | `GOOGLE_CLIENT_ID`         | empty (Google sign-in disabled)               |
    /// | `GOOGLE_CLIENT_SECRET`     | empty                                         |
    /// | `GOOGLE_ALLOWED_AUDIENCES` | empty, comma separated                        |
    /// | `GOOGLE_TOKEN_ENDPOINT`    | `https://oauth2.googleapis.com/token`         |
    /// | `GOOGLE_JWKS_URL`          | `https://www.googleapis.com/oauth2/v3/certs`  |
    /// | `DEFAULT_CURRENCY`         | `INR`                                         |
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:3100"),
            pg_connection_url: env_or("DATABASE_URL", "postgres://localhost:5432/astro"),
            jwt: JwtSettings {
                secret: resolve_secret(&["JWT_SECRET"], "jwt-secret"),
                issuer: env_or("JWT_ISSUER", "astro-api"),
                audience: env_or("JWT_AUDIENCE", "astro-api"),
                access_token_minutes: env_number("ACCESS_TOKEN_MINUTES", 15),
                refresh_token_days: env_number("REFRESH_TOKEN_DAYS", 14),
            },
            refresh_token_hash_key: resolve_secret(
                &["REFRESH_TOKEN_HASH_KEY"],
                "refresh-token-hash-key",
            ),
            refresh_cookie: RefreshCookieSettings {
                name: env_or("REFRESH_COOKIE_NAME", "astro_refresh"),
                same_site: parse_same_site(&env_or("REFRESH_COOKIE_SAME_SITE", "none")),
            },
            google: GoogleSettings {
                client_id: env_or("GOOGLE_CLIENT_ID", ""),
                client_secret: env_or("GOOGLE_CLIENT_SECRET", ""),
                allowed_audiences: split_list(&env_or("GOOGLE_ALLOWED_AUDIENCES", "")),
                token_endpoint: env_or(
                    "GOOGLE_TOKEN_ENDPOINT",
                    "https://oauth2.googleapis.com/token",
                ),
                jwks_url: env_or(
                    "GOOGLE_JWKS_URL",
                    "https://www.googleapis.com/oauth2/v3/certs",
                ),
            },
            default_currency: env_or("DEFAULT_CURRENCY", "INR").trim().to_uppercase(),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_number(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `none`, `lax` or `strict`, case-insensitive. Anything else is `Lax`.
pub fn parse_same_site(raw: &str) -> SameSite {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" => SameSite::None,
        "strict" => SameSite::Strict,
        _ => SameSite::Lax,
    }
}
