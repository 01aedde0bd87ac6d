//! Request/response types for auth endpoints and the error-to-HTTP mapping.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use crate::identity::{AuthError, BindOutcome, Bootstrap, Profile, RegistrationIntent, Role, Route};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    /// Route the client is on; redirect-exempt routes keep the user in place.
    #[serde(default)]
    pub current_path: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OAuthStartRequest {
    pub provider: String,
    pub role: Role,
}

/// Tokens the provider handed back on the redirect to the callback route.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CallbackRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub current_path: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetPasswordRequest {
    pub password: String,
    pub confirmation: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailChangeRequest {
    pub new_email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ReturnNoticeRequest {
    /// Full URL the provider redirected the browser to.
    pub url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct SessionQuery {
    pub path: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BindResult {
    Bound,
    AlreadyBound,
    NoSelection,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RoleBindingResponse {
    pub result: BindResult,
    pub role: Option<Role>,
}

impl From<BindOutcome> for RoleBindingResponse {
    fn from(outcome: BindOutcome) -> Self {
        match outcome {
            BindOutcome::Bound(role) => Self {
                result: BindResult::Bound,
                role: Some(role),
            },
            BindOutcome::AlreadyBound(role) => Self {
                result: BindResult::AlreadyBound,
                role: Some(role),
            },
            BindOutcome::NoSelection => Self {
                result: BindResult::NoSelection,
                role: None,
            },
        }
    }
}

/// Result of a session event, as the client needs it.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BootstrapResponse {
    pub outcome: String,
    pub profile: Option<Profile>,
    pub redirect: Option<Route>,
    pub redirect_path: Option<String>,
    pub password_setup_required: bool,
    pub role_binding: Option<RoleBindingResponse>,
}

impl BootstrapResponse {
    pub(super) fn new(outcome: &str, bootstrap: Bootstrap) -> Self {
        Self {
            outcome: outcome.to_string(),
            profile: bootstrap.profile,
            redirect: bootstrap.redirect,
            redirect_path: bootstrap.redirect.map(|route| route.path().to_string()),
            password_setup_required: bootstrap.password_setup_required,
            role_binding: bootstrap.role_binding.map(RoleBindingResponse::from),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerificationResponse {
    pub outcome: String,
    pub intent: Option<RegistrationIntent>,
    pub resend_available_in_seconds: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RedirectResponse {
    pub outcome: String,
    pub url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OutcomeResponse {
    pub outcome: String,
    pub redirect_path: Option<String>,
}

impl OutcomeResponse {
    pub(super) fn new(outcome: &str) -> Self {
        Self {
            outcome: outcome.to_string(),
            redirect_path: None,
        }
    }

    pub(super) fn redirect(outcome: &str, route: Route) -> Self {
        Self {
            outcome: outcome.to_string(),
            redirect_path: Some(route.path().to_string()),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ReturnNoticeResponse {
    pub outcome: String,
    pub error: Option<ErrorResponse>,
    pub message: Option<String>,
    pub email_changed: bool,
    /// The URL to show, without the one-shot `email_changed` flag.
    pub cleaned_url: Option<String>,
}

/// JSON body for every failed auth outcome.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub outcome: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&AuthError> for ErrorResponse {
    fn from(err: &AuthError) -> Self {
        let mut body = Self {
            outcome: err.code().to_string(),
            message: err.to_string(),
            actual_role: None,
            email: None,
            retry_after_seconds: None,
            code: None,
            description: None,
        };
        match err {
            AuthError::RoleMismatch { actual } => body.actual_role = Some(*actual),
            AuthError::IncompleteRegistration { email } => body.email = Some(email.clone()),
            AuthError::CooldownActive { retry_after } => {
                body.retry_after_seconds = Some(retry_after_seconds(*retry_after));
            }
            AuthError::LinkExpiredOrInvalid { code, description } => {
                body.code = Some(code.clone());
                body.description = Some(description.clone());
            }
            _ => {}
        }
        body
    }
}

/// Whole seconds, rounded up so a client never retries too early.
fn retry_after_seconds(retry_after: Duration) -> u64 {
    retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)
}

pub(super) const fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::UnknownEmail => StatusCode::NOT_FOUND,
        AuthError::RoleMismatch { .. } => StatusCode::FORBIDDEN,
        AuthError::IncompleteRegistration { .. } | AuthError::EmailAlreadyRegistered => {
            StatusCode::CONFLICT
        }
        AuthError::InvalidPassword => StatusCode::UNAUTHORIZED,
        AuthError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::ProviderError => StatusCode::BAD_GATEWAY,
        AuthError::DirectoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::LinkExpiredOrInvalid { .. } | AuthError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

pub(super) fn error_response(err: &AuthError) -> Response {
    let body = ErrorResponse::from(err);
    let retry_after = body.retry_after_seconds;
    let mut response = (status_for(err), Json(body)).into_response();
    if let Some(seconds) = retry_after {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(seconds));
    }
    response
}

pub(super) fn bad_request(rejection: &JsonRejection) -> Response {
    error_response(&AuthError::InvalidInput(rejection.body_text()))
}

pub(super) fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            outcome: "unauthenticated".to_string(),
            message: "no active session".to_string(),
            actual_role: None,
            email: None,
            retry_after_seconds: None,
            code: None,
            description: None,
        }),
    )
        .into_response()
}
