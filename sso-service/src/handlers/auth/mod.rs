pub mod email;
pub mod federation;
pub mod recovery;
pub mod session;
pub mod webauthn;

use axum_extra::extract::cookie::CookieJar;

use crate::{services::TokenPair, utils::cookies, AppState};

/// Attach a freshly minted pair to the response cookies.
pub(crate) fn session_jar(state: &AppState, jar: CookieJar, pair: &TokenPair) -> CookieJar {
    cookies::with_session(
        jar,
        pair,
        state.config.access_token_ttl_seconds(),
        state.config.refresh_token_ttl_seconds(),
    )
}
