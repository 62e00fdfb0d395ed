//! `access` / `refresh` session cookies.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::services::TokenPair;

pub const ACCESS_COOKIE: &str = "access";
pub const REFRESH_COOKIE: &str = "refresh";

fn session_cookie(name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

/// Add both cookies, each living as long as its token.
pub fn with_session(
    jar: CookieJar,
    pair: &TokenPair,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access.clone(),
        access_ttl_seconds,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh.clone(),
        refresh_ttl_seconds,
    ))
}

/// Overwrite both cookies with empty, already-expired values.
pub fn cleared(jar: CookieJar) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, String::new(), 0))
        .add(session_cookie(REFRESH_COOKIE, String::new(), 0))
}
