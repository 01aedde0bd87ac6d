//! Double-confirmation email change and the return-URL conventions the
//! provider uses to report back.

use std::sync::Arc;
use tracing::{error, info};
use url::Url;

use super::config::AuthConfig;
use super::error::{AuthError, ProviderError};
use super::provider::IdentityProvider;
use super::types::{Route, Session};
use super::utils::{normalize_email, provider_call, valid_email};

pub const EMAIL_CHANGED_PARAM: &str = "email_changed";

pub struct EmailChange {
    provider: Arc<dyn IdentityProvider>,
    config: AuthConfig,
}

impl EmailChange {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, config: AuthConfig) -> Self {
        Self { provider, config }
    }

    /// Where the provider sends the user once both addresses confirmed.
    #[must_use]
    pub fn return_url(&self) -> String {
        format!(
            "{}?{EMAIL_CHANGED_PARAM}=true",
            self.config.route_url(Route::Profile)
        )
    }

    /// Ask the provider to start the change. The identity's email is only
    /// updated after both the old and the new address confirm.
    ///
    /// # Errors
    /// [`AuthError::InvalidInput`] for a malformed email, one equal to the
    /// current email, or one the provider refuses; otherwise
    /// [`AuthError::ProviderError`].
    pub async fn request_email_change(
        &self,
        session: &Session,
        new_email: &str,
    ) -> Result<(), AuthError> {
        let new_email = normalize_email(new_email);
        if !valid_email(&new_email) {
            return Err(AuthError::InvalidInput("invalid email".to_string()));
        }
        if new_email == normalize_email(&session.identity.email) {
            return Err(AuthError::InvalidInput(
                "new email must differ from the current email".to_string(),
            ));
        }

        provider_call(
            "update_email",
            self.config.call_timeout(),
            self.provider
                .update_email(&session.access_token, &new_email, &self.return_url()),
        )
        .await
        .map_err(|err| match err {
            ProviderError::Rejected { status, message } if (400..500).contains(&status) => {
                AuthError::InvalidInput(message)
            }
            err => {
                error!(
                    operation = "update_email",
                    email = %session.identity.email,
                    "provider failure: {err}"
                );
                AuthError::ProviderError
            }
        })?;
        info!(identity_id = %session.identity.id, "email change requested");
        Ok(())
    }
}

/// Information the provider attached to a redirect back into the app.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReturnNotice {
    /// Set when the fragment carries `error_code`/`error_description`.
    pub error: Option<AuthError>,
    /// Informational `message` query parameter.
    pub message: Option<String>,
}

impl ReturnNotice {
    #[must_use]
    pub fn parse(url: &Url) -> Self {
        let fragment_pairs: Vec<(String, String)> = url
            .fragment()
            .map(|fragment| {
                url::form_urlencoded::parse(fragment.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        let fragment_value = |key: &str| {
            fragment_pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        let code = fragment_value("error_code");
        let description = fragment_value("error_description");
        let error = if code.is_some() || description.is_some() {
            Some(AuthError::LinkExpiredOrInvalid {
                code: code.unwrap_or_default(),
                description: description.unwrap_or_default(),
            })
        } else {
            None
        };

        let message = url
            .query_pairs()
            .find(|(k, _)| k == "message")
            .map(|(_, v)| v.into_owned());

        Self { error, message }
    }
}

/// When `url` carries `email_changed=true`, return it with the flag removed
/// so a refresh does not show the notice again.
#[must_use]
pub fn take_email_changed_flag(url: &Url) -> Option<Url> {
    let flagged = url
        .query_pairs()
        .any(|(k, v)| k == EMAIL_CHANGED_PARAM && v == "true");
    if !flagged {
        return None;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != EMAIL_CHANGED_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(cleaned)
}
