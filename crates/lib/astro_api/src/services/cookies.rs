//! Refresh cookie: HttpOnly, scoped to `/auth`, expiring with the session.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Utc};
use time::{Duration, OffsetDateTime};

use crate::config::RefreshCookieSettings;

const COOKIE_PATH: &str = "/auth";

/// Build the refresh cookie for a newly issued token.
pub fn refresh_cookie(
    settings: &RefreshCookieSettings,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Cookie<'static> {
    let builder = Cookie::build((settings.name.clone(), token.to_string()))
        .http_only(true)
        .secure(settings.secure())
        .same_site(settings.same_site)
        .path(COOKIE_PATH);
    match OffsetDateTime::from_unix_timestamp(expires_at.timestamp()) {
        Ok(at) => builder.expires(at).build(),
        Err(_) => builder
            .max_age(Duration::seconds((expires_at - Utc::now()).num_seconds().max(0)))
            .build(),
    }
}

/// Build an expired cookie to clear the refresh token.
pub fn clear_refresh_cookie(settings: &RefreshCookieSettings) -> Cookie<'static> {
    Cookie::build((settings.name.clone(), String::new()))
        .http_only(true)
        .secure(settings.secure())
        .same_site(settings.same_site)
        .path(COOKIE_PATH)
        .max_age(Duration::ZERO)
        .build()
}

/// The presented refresh token, if the cookie is set and non-blank.
pub fn read_refresh_token(jar: &CookieJar, settings: &RefreshCookieSettings) -> Option<String> {
    jar.get(&settings.name)
        .map(|c| c.value().trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use axum_extra::extract::cookie::SameSite;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn refresh_cookie_attributes() {
        let settings = RefreshCookieSettings::default();
        let expires = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let cookie = refresh_cookie(&settings, "tok", expires);
        assert_eq!(cookie.name(), "astro_refresh");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.path(), Some("/auth"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(
            cookie.expires_datetime().map(|t| t.unix_timestamp()),
            Some(expires.timestamp())
        );
    }

    #[test]
    fn lax_cookie_is_not_forced_secure() {
        let settings = RefreshCookieSettings {
            name: "r".into(),
            same_site: SameSite::Lax,
        };
        let cookie = clear_refresh_cookie(&settings);
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.value(), "");
    }

    #[test]
    fn blank_cookie_reads_as_absent() {
        let settings = RefreshCookieSettings::default();
        let jar = CookieJar::new().add(Cookie::new("astro_refresh", "  "));
        assert_eq!(read_refresh_token(&jar, &settings), None);
        let jar = CookieJar::new().add(Cookie::new("astro_refresh", "abc"));
        assert_eq!(read_refresh_token(&jar, &settings).as_deref(), Some("abc"));
    }
}
