//! HTTP adapter for a GoTrue-compatible identity provider.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::IdentityProvider;
use crate::identity::error::ProviderError;
use crate::identity::types::{AuthMethod, Identity, IdentityMetadata, OtpRequest, Role, Session};

#[derive(Clone, Debug)]
pub struct GoTrueConfig {
    base_url: String,
    anon_key: SecretString,
    service_key: SecretString,
    timeout: Duration,
}

impl GoTrueConfig {
    #[must_use]
    pub fn new(base_url: String, anon_key: SecretString, service_key: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_key,
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
pub struct GoTrueProvider {
    client: Client,
    config: GoTrueConfig,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    user: UserResponse,
}

#[derive(Deserialize, Debug)]
struct UserResponse {
    id: Uuid,
    email: Option<String>,
    email_confirmed_at: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
    #[serde(default)]
    user_metadata: UserMetadata,
}

/// Service-owned facts; only the admin API can write these.
#[derive(Deserialize, Debug, Default)]
struct AppMetadata {
    provider: Option<String>,
    role: Option<String>,
    has_password: Option<bool>,
}

/// Editable by the user. `role` is the choice sent with the signup link.
#[derive(Deserialize, Debug, Default)]
struct UserMetadata {
    name: Option<String>,
    full_name: Option<String>,
    role: Option<String>,
}

impl UserResponse {
    fn into_identity(self) -> Identity {
        let provider = self.app_metadata.provider.as_deref().unwrap_or("email");
        let method = AuthMethod::from_provider_tag(provider);
        Identity {
            id: self.id,
            email: self.email.unwrap_or_default().to_lowercase(),
            method,
            has_password: self.app_metadata.has_password.unwrap_or(false),
            email_verified: self.email_confirmed_at.is_some(),
            name: self.user_metadata.name.or(self.user_metadata.full_name),
            role: self
                .app_metadata
                .role
                .or(self.user_metadata.role)
                .as_deref()
                .and_then(|role| role.parse::<Role>().ok()),
        }
    }
}

impl GoTrueProvider {
    /// Build the provider client.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: GoTrueConfig) -> anyhow::Result<Self> {
        Url::parse(&config.base_url)
            .map_err(|err| anyhow::anyhow!("Invalid provider URL {}: {err}", config.base_url))?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn public(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = self.config.anon_key.expose_secret();
        builder.header("apikey", key).bearer_auth(key)
    }

    fn admin(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(self.config.service_key.expose_secret())
    }

    fn user(&self, builder: RequestBuilder, access_token: &SecretString) -> RequestBuilder {
        builder
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(access_token.expose_secret())
    }
}

fn transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

/// Pull a human readable message out of the various error shapes GoTrue returns.
fn error_message(body: &Value) -> String {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string()
}

/// Whether a `/token` rejection means the email/password pair is wrong.
fn bad_credentials(body: &Value) -> bool {
    match body.get("error_code").and_then(Value::as_str) {
        Some(code) => code == "invalid_credentials",
        None => body.get("error").and_then(Value::as_str) == Some("invalid_grant"),
    }
}

async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = error_message(&body);
    if status.is_server_error() {
        Err(ProviderError::Unavailable(format!("{status}: {message}")))
    } else {
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

async fn send(builder: RequestBuilder) -> Result<Response, ProviderError> {
    let response = builder.send().await.map_err(|err| transport_error(&err))?;
    check(response).await
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    #[instrument(skip(self, password))]
    async fn password_sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, ProviderError> {
        let request = self
            .public(self.client.post(self.endpoint("/token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password.expose_secret() }));

        let response = request.send().await.map_err(|err| transport_error(&err))?;
        let status = response.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if bad_credentials(&body) {
                return Err(ProviderError::InvalidCredentials);
            }
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        let token: TokenResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;

        let mut identity = token.user.into_identity();
        identity.has_password = true;
        Ok(Session {
            access_token: SecretString::from(token.access_token),
            refresh_token: token.refresh_token.map(SecretString::from),
            expires_in: token.expires_in,
            identity,
        })
    }

    fn federated_sign_in_url(
        &self,
        provider: &str,
        redirect_url: &str,
    ) -> Result<Url, ProviderError> {
        Url::parse_with_params(
            &self.endpoint("/authorize"),
            &[("provider", provider), ("redirect_to", redirect_url)],
        )
        .map_err(|err| ProviderError::InvalidResponse(err.to_string()))
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn otp_sign_in(
        &self,
        request: &OtpRequest,
        redirect_url: &str,
    ) -> Result<(), ProviderError> {
        let mut data = serde_json::Map::new();
        if let Some(name) = &request.name {
            data.insert("name".to_string(), json!(name));
        }
        if let Some(role) = request.role {
            data.insert("role".to_string(), json!(role.as_str()));
        }
        let builder = self
            .public(self.client.post(self.endpoint("/otp")))
            .query(&[("redirect_to", redirect_url)])
            .json(&json!({
                "email": request.email,
                "create_user": request.create_user,
                "data": data,
            }));
        send(builder).await?;
        debug!("magic link requested");
        Ok(())
    }

    #[instrument(skip(self, new_password))]
    async fn update_password(
        &self,
        identity_id: Uuid,
        new_password: &SecretString,
    ) -> Result<(), ProviderError> {
        let builder = self
            .admin(
                self.client
                    .put(self.endpoint(&format!("/admin/users/{identity_id}"))),
            )
            .json(&json!({
                "password": new_password.expose_secret(),
                "app_metadata": { "has_password": true },
            }));
        send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn request_password_reset(
        &self,
        email: &str,
        redirect_url: &str,
    ) -> Result<(), ProviderError> {
        let builder = self
            .public(self.client.post(self.endpoint("/recover")))
            .query(&[("redirect_to", redirect_url)])
            .json(&json!({ "email": email }));
        send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn update_email(
        &self,
        access_token: &SecretString,
        new_email: &str,
        redirect_url: &str,
    ) -> Result<(), ProviderError> {
        let builder = self
            .user(self.client.put(self.endpoint("/user")), access_token)
            .query(&[("redirect_to", redirect_url)])
            .json(&json!({ "email": new_email }));
        send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn session_identity(
        &self,
        access_token: &SecretString,
    ) -> Result<Identity, ProviderError> {
        let builder = self.user(self.client.get(self.endpoint("/user")), access_token);
        let user: UserResponse = send(builder)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        Ok(user.into_identity())
    }

    #[instrument(skip(self))]
    async fn identity_metadata(
        &self,
        identity_id: Uuid,
    ) -> Result<IdentityMetadata, ProviderError> {
        let builder = self.admin(
            self.client
                .get(self.endpoint(&format!("/admin/users/{identity_id}"))),
        );
        let user: UserResponse = send(builder)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        let identity = user.into_identity();
        Ok(IdentityMetadata {
            email_verified: identity.email_verified,
            has_password: identity.has_password,
        })
    }

    #[instrument(skip(self))]
    async fn bind_role(&self, identity_id: Uuid, role: Role) -> Result<(), ProviderError> {
        let builder = self
            .admin(
                self.client
                    .put(self.endpoint(&format!("/admin/users/{identity_id}"))),
            )
            .json(&json!({ "app_metadata": { "role": role.as_str() } }));
        send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self, access_token))]
    async fn sign_out(&self, access_token: &SecretString) -> Result<(), ProviderError> {
        let builder = self.user(self.client.post(self.endpoint("/logout")), access_token);
        send(builder).await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), ProviderError> {
        send(self.public(self.client.get(self.endpoint("/health")))).await?;
        Ok(())
    }
}
