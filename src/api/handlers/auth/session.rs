//! Session endpoints and the cookies that carry them.

use axum::{
    Json,
    extract::{Extension, Query},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use super::{
    state::AuthState,
    types::{BootstrapResponse, OutcomeResponse, SessionQuery},
};
use crate::identity::{AuthConfig, Route, Session, SessionEvent};

pub(super) const SESSION_COOKIE_NAME: &str = "staykey_session";
pub(super) const BROWSER_COOKIE_NAME: &str = "staykey_browser";
const BROWSER_COOKIE_MAX_AGE_SECONDS: u64 = 30 * 24 * 60 * 60;

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    params(
        ("path" = Option<String>, Query, description = "Route the client is on")
    ),
    responses(
        (status = 200, description = "Session is active", body = BootstrapResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    let current_path = query
        .path
        .unwrap_or_else(|| Route::Landing.path().to_string());

    let Some((_, session)) = current_session(&headers, &auth_state).await else {
        // Stale cookies are cleared so the client stops sending them.
        let mut response_headers = HeaderMap::new();
        if extract_cookie(&headers, SESSION_COOKIE_NAME).is_some() {
            if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
                response_headers.insert(SET_COOKIE, cookie);
            }
        }
        return (StatusCode::NO_CONTENT, response_headers).into_response();
    };

    let browser_key = extract_cookie(&headers, BROWSER_COOKIE_NAME);
    let bootstrap = auth_state
        .service()
        .session_event(
            SessionEvent::InitialLoad(Some(session)),
            browser_key.as_deref(),
            &current_path,
        )
        .await;
    (
        StatusCode::OK,
        Json(BootstrapResponse::new("authenticated", bootstrap)),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Session cleared", body = BootstrapResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    let session = match extract_session_token(&headers) {
        Some(token) => auth_state.sessions().revoke(&token).await,
        None => None,
    };
    match session {
        Some(session) => {
            let bootstrap = auth_state.service().sign_out(&session).await;
            (
                StatusCode::OK,
                response_headers,
                Json(BootstrapResponse::new("signed_out", bootstrap)),
            )
                .into_response()
        }
        None => (
            StatusCode::OK,
            response_headers,
            Json(OutcomeResponse::redirect("signed_out", Route::Landing)),
        )
            .into_response(),
    }
}

/// Register a freshly authenticated session, run the sign-in bootstrap, and
/// answer with the session cookie set.
pub(super) async fn establish(
    auth_state: &AuthState,
    headers: &HeaderMap,
    session: Session,
    current_path: &str,
) -> Response {
    let token = match auth_state.sessions().create(session.clone()).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let Ok(cookie) = session_cookie(auth_state.config(), &token) else {
        error!("Failed to build session cookie");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let browser_key = extract_cookie(headers, BROWSER_COOKIE_NAME);
    let bootstrap = auth_state
        .service()
        .session_event(
            SessionEvent::SignedIn(session),
            browser_key.as_deref(),
            current_path,
        )
        .await;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    (
        StatusCode::OK,
        response_headers,
        Json(BootstrapResponse::new("authenticated", bootstrap)),
    )
        .into_response()
}

/// Resolve the request's session token into a live session.
pub(super) async fn current_session(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Option<(String, Session)> {
    let token = extract_session_token(headers)?;
    let session = auth_state.sessions().lookup(&token).await?;
    Some((token, session))
}

fn cookie(
    config: &AuthConfig,
    name: &str,
    value: &str,
    max_age: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(config, SESSION_COOKIE_NAME, token, config.session_ttl().as_secs())
}

pub(super) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(config, SESSION_COOKIE_NAME, "", 0)
}

pub(super) fn browser_cookie(
    config: &AuthConfig,
    browser_key: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(
        config,
        BROWSER_COOKIE_NAME,
        browser_key,
        BROWSER_COOKIE_MAX_AGE_SECONDS,
    )
}

pub(super) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, SESSION_COOKIE_NAME))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
