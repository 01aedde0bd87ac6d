//! Role-aware password login.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

use super::{
    session::establish,
    state::AuthState,
    types::{BootstrapResponse, ErrorResponse, LoginRequest, bad_request, error_response},
};
use crate::identity::Route;

/// Check the email and role against the directory, then the password against
/// the identity provider. Checks run in that order so a wrong role is reported
/// even with a wrong password.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = BootstrapResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Wrong password", body = ErrorResponse),
        (
            status = 403,
            description = "Email is registered under the other role",
            body = ErrorResponse
        ),
        (status = 404, description = "No account for this email", body = ErrorResponse),
        (
            status = 409,
            description = "Registration not finished; no password yet",
            body = ErrorResponse
        ),
        (status = 502, description = "Identity provider failure", body = ErrorResponse),
        (status = 503, description = "Account directory unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    let password = SecretString::from(request.password);
    match auth_state
        .service()
        .attempt_login(&request.email, &password, request.role)
        .await
    {
        Ok(session) => {
            let current_path = request
                .current_path
                .unwrap_or_else(|| Route::Login.path().to_string());
            establish(&auth_state, &headers, session, &current_path).await
        }
        Err(err) => {
            debug!(outcome = err.code(), "login refused");
            error_response(&err)
        }
    }
}
