//! First-password setup and reset requests.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use super::{
    session::{clear_session_cookie, current_session},
    state::AuthState,
    types::{
        EmailRequest, ErrorResponse, OutcomeResponse, SetPasswordRequest, bad_request,
        error_response, unauthenticated,
    },
};

/// Set the first password. The session is ended afterwards and the client
/// must sign in again with the new password.
#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password set; session cleared", body = OutcomeResponse),
        (
            status = 400,
            description = "Too short, mismatched, or refused by the provider",
            body = ErrorResponse
        ),
        (status = 401, description = "No active session", body = ErrorResponse),
        (status = 502, description = "Identity provider failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn set_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<SetPasswordRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Some((_, session)) = current_session(&headers, &auth_state).await else {
        return unauthenticated();
    };
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    let route = match auth_state
        .service()
        .set_password(
            &session,
            &SecretString::from(request.password),
            &SecretString::from(request.confirmation),
        )
        .await
    {
        Ok(route) => route,
        Err(err) => return error_response(&err),
    };

    let revoked = auth_state
        .sessions()
        .revoke_identity(session.identity.id)
        .await;
    info!(identity_id = %session.identity.id, revoked, "sessions ended after password setup");

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(OutcomeResponse::redirect("password_set", route)),
    )
        .into_response()
}

/// Request a password reset link. Succeeds for unknown emails too.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Reset requested", body = OutcomeResponse),
        (status = 400, description = "Malformed email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn password_reset(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    match auth_state
        .service()
        .request_password_reset(&request.email)
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(OutcomeResponse::new("reset_requested")),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
