//! Email change requests and provider return-URL notices.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use url::Url;

use super::{
    session::current_session,
    state::AuthState,
    types::{
        EmailChangeRequest, ErrorResponse, OutcomeResponse, ReturnNoticeRequest,
        ReturnNoticeResponse, bad_request, error_response, unauthenticated,
    },
};
use crate::identity::{AuthError, ReturnNotice, take_email_changed_flag};

/// Start a double-confirmation email change. The email only changes once the
/// links sent to both the current and the new address are followed.
#[utoipa::path(
    post,
    path = "/v1/auth/email",
    request_body = EmailChangeRequest,
    responses(
        (status = 202, description = "Confirmation links sent", body = OutcomeResponse),
        (
            status = 400,
            description = "Malformed, unchanged, or refused email",
            body = ErrorResponse
        ),
        (status = 401, description = "No active session", body = ErrorResponse),
        (status = 502, description = "Identity provider failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn change_email(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<EmailChangeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Some((_, session)) = current_session(&headers, &auth_state).await else {
        return unauthenticated();
    };
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    match auth_state
        .service()
        .request_email_change(&session, &request.new_email)
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(OutcomeResponse::new("confirmation_sent")),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Read what the provider reported on a redirect back into the app.
#[utoipa::path(
    post,
    path = "/v1/auth/return-notice",
    request_body = ReturnNoticeRequest,
    responses(
        (status = 200, description = "Parsed notice", body = ReturnNoticeResponse),
        (status = 400, description = "Not a URL", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn return_notice(
    payload: Result<Json<ReturnNoticeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };
    let Ok(url) = Url::parse(request.url.trim()) else {
        return error_response(&AuthError::InvalidInput("invalid url".to_string()));
    };

    let notice = ReturnNotice::parse(&url);
    let cleaned = take_email_changed_flag(&url);
    (
        StatusCode::OK,
        Json(ReturnNoticeResponse {
            outcome: "notice".to_string(),
            error: notice.error.as_ref().map(ErrorResponse::from),
            message: notice.message,
            email_changed: cleaned.is_some(),
            cleaned_url: cleaned.map(|url| url.to_string()),
        }),
    )
        .into_response()
}
