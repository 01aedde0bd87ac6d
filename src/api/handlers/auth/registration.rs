//! Password-less registration: magic link send, resend, and resume.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{
    state::AuthState,
    types::{
        EmailRequest, ErrorResponse, RegisterRequest, VerificationResponse, bad_request,
        error_response,
    },
};
use crate::identity::{RegistrationIntent, utils::normalize_email};

async fn verification_sent(
    auth_state: &AuthState,
    intent: Option<RegistrationIntent>,
    email: &str,
) -> Response {
    let remaining = auth_state
        .service()
        .resend_available_in(email)
        .await
        .map_or(0, |remaining| {
            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
        });
    (
        StatusCode::ACCEPTED,
        Json(VerificationResponse {
            outcome: "verification_sent".to_string(),
            intent,
            resend_available_in_seconds: remaining,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "Magic link sent", body = VerificationResponse),
        (status = 400, description = "Malformed email or empty name", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 502, description = "Identity provider failure", body = ErrorResponse),
        (status = 503, description = "Account directory unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    match auth_state
        .service()
        .start_registration(&request.email, &request.display_name, request.role)
        .await
    {
        Ok(intent) => {
            let email = intent.email.clone();
            verification_sent(&auth_state, Some(intent), &email).await
        }
        Err(err) => error_response(&err),
    }
}

/// Send the magic link again for a registration started on this client.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "Magic link sent again", body = VerificationResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 429, description = "Cooldown still running", body = ErrorResponse),
        (status = 502, description = "Identity provider failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };
    let intent = RegistrationIntent {
        email: normalize_email(&request.email),
        display_name: request.display_name.trim().to_string(),
        role: request.role,
    };

    match auth_state.service().resend_verification(&intent).await {
        Ok(stored) => {
            let email = stored.email.clone();
            verification_sent(&auth_state, Some(stored), &email).await
        }
        Err(err) => error_response(&err),
    }
}

/// Re-send the sign-in link to an account that never set a password.
#[utoipa::path(
    post,
    path = "/v1/auth/resume-registration",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Magic link sent", body = VerificationResponse),
        (status = 400, description = "Account already has a password", body = ErrorResponse),
        (status = 404, description = "No account for this email", body = ErrorResponse),
        (status = 429, description = "Cooldown still running", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resume_registration(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    match auth_state
        .service()
        .resume_registration(&request.email)
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(VerificationResponse {
                outcome: "verification_sent".to_string(),
                intent: None,
                resend_available_in_seconds: auth_state.config().resend_cooldown().as_secs(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
