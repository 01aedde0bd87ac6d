//! Federated sign-in: capture the role before the redirect, bind it after.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::error;

use super::{
    session::{BROWSER_COOKIE_NAME, browser_cookie, establish, extract_cookie},
    state::AuthState,
    types::{
        BootstrapResponse, CallbackRequest, ErrorResponse, OAuthStartRequest, RedirectResponse,
        bad_request, error_response,
    },
    utils::generate_browser_key,
};
use crate::identity::{AuthError, Route};

/// Store the role picked on this browser and return the provider URL to
/// navigate to. Sets the browser cookie when missing.
#[utoipa::path(
    post,
    path = "/v1/auth/oauth/start",
    request_body = OAuthStartRequest,
    responses(
        (status = 200, description = "Redirect URL for the provider", body = RedirectResponse),
        (status = 400, description = "Provider not enabled", body = ErrorResponse),
        (status = 503, description = "Selection could not be stored", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn oauth_start(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<OAuthStartRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    let browser_key =
        extract_cookie(&headers, BROWSER_COOKIE_NAME).unwrap_or_else(generate_browser_key);
    let url = match auth_state
        .service()
        .begin_oauth(&browser_key, &request.provider, request.role)
        .await
    {
        Ok(url) => url,
        Err(err) => return error_response(&err),
    };

    let mut response_headers = HeaderMap::new();
    match browser_cookie(auth_state.config(), &browser_key) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build browser cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    (
        StatusCode::OK,
        response_headers,
        Json(RedirectResponse {
            outcome: "redirect".to_string(),
            url: url.to_string(),
        }),
    )
        .into_response()
}

/// Exchange the tokens from the provider redirect for a session. Federated
/// identities get the role stored by `oauth/start` bound here.
#[utoipa::path(
    post,
    path = "/v1/auth/callback",
    request_body = CallbackRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = BootstrapResponse),
        (status = 400, description = "Link expired or token refused", body = ErrorResponse),
        (status = 502, description = "Identity provider failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn callback(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };
    if request.access_token.trim().is_empty() {
        return error_response(&AuthError::InvalidInput("missing access token".to_string()));
    }

    let session = match auth_state
        .service()
        .resolve_session(
            SecretString::from(request.access_token),
            request.refresh_token.map(SecretString::from),
            request.expires_in,
        )
        .await
    {
        Ok(session) => session,
        Err(err) => return error_response(&err),
    };

    let current_path = request
        .current_path
        .unwrap_or_else(|| Route::Landing.path().to_string());
    establish(&auth_state, &headers, session, &current_path).await
}
