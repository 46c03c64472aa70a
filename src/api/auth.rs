use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use super::server::{verified_session, AppState};
use super::{AuthResponse, LoginRequest, SessionStatus};
use crate::handlers::session::{SESSION_COOKIE, SESSION_TTL_DAYS};

/// Session routes: sign in, check, sign out
pub fn create_auth_router() -> Router<Arc<AppState>> {
    Router::new().route("/auth", get(session_status).post(login).delete(logout))
}

fn auth_failure(status: StatusCode, error: &str) -> (StatusCode, Json<AuthResponse>) {
    (
        status,
        Json(AuthResponse {
            success: false,
            error: Some(error.to_string()),
        }),
    )
}

/// Validate the access code and set the session cookie
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> impl IntoResponse {
    let code = serde_json::from_slice::<LoginRequest>(&body)
        .ok()
        .and_then(|request| request.code)
        .filter(|code| !code.trim().is_empty());

    let Some(code) = code else {
        return auth_failure(StatusCode::BAD_REQUEST, "Code required").into_response();
    };

    let Some(token) = state.sessions.issue(&code) else {
        return auth_failure(StatusCode::UNAUTHORIZED, "Invalid code").into_response();
    };

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build();

    log::info!("🔑 New session issued");
    (
        StatusCode::OK,
        jar.add(cookie),
        Json(AuthResponse {
            success: true,
            error: None,
        }),
    )
        .into_response()
}

async fn session_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Json<SessionStatus> {
    let authenticated = verified_session(&state.sessions, &headers, &jar).is_some();

    Json(SessionStatus { authenticated })
}

/// Revoke the current session and clear the cookie
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<AuthResponse>) {
    if let Some(token) = verified_session(&state.sessions, &headers, &jar) {
        state.sessions.revoke(&token);
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(AuthResponse {
            success: true,
            error: None,
        }),
    )
}
