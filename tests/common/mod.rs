//! Shared wiring for the HTTP-level tests: the real router and GoTrue adapter,
//! with the provider served by a mock server and the directory kept in memory.

#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use staykey::{
    api::{self, handlers::auth::AuthState},
    identity::{
        AuthConfig, AuthService, Collaborators, Profile, Role,
        provider::{GoTrueConfig, GoTrueProvider},
    },
    storage::MemoryStore,
};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub const FRONTEND: &str = "https://staykey.test";

pub struct TestApp {
    pub router: Router,
    pub gotrue: MockServer,
    pub store: Arc<MemoryStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Value of the named cookie in `Set-Cookie`, if the response sets it.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(&format!("{name}=")))
            .map(str::to_string)
    }
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        let gotrue = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let provider = GoTrueProvider::new(GoTrueConfig::new(
            gotrue.uri(),
            SecretString::from("anon-key".to_string()),
            SecretString::from("service-key".to_string()),
        ))?;
        let config = AuthConfig::new(FRONTEND.to_string())
            .with_resend_cooldown_seconds(10)
            .with_call_timeout_seconds(5);
        let service = AuthService::new(
            config,
            Collaborators {
                directory: store.clone(),
                profiles: store.clone(),
                pending: store.clone(),
                provider: Arc::new(provider),
            },
        );
        let router = api::router(Arc::new(AuthState::new(service)))?;
        Ok(Self {
            router,
            gotrue,
            store,
        })
    }

    pub async fn seed_profile(&self, email: &str, role: Option<Role>, has_password: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert(Profile {
                id,
                email: email.to_string(),
                role,
                display_name: "Seeded".to_string(),
                phone: None,
                has_password,
            })
            .await;
        id
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookies: &[(&str, &str)],
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if !cookies.is_empty() {
            let cookie = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await?.to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response body is not JSON")?
        };
        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn post(&self, uri: &str, body: Value) -> Result<TestResponse> {
        self.request(Method::POST, uri, Some(body), &[]).await
    }
}

/// GoTrue user object as returned by `/user` and `/admin/users/{id}`.
pub fn user_json(
    id: Uuid,
    email: &str,
    provider: &str,
    has_password: bool,
    role: Option<Role>,
) -> Value {
    json!({
        "id": id,
        "email": email,
        "email_confirmed_at": "2026-01-01T00:00:00Z",
        "app_metadata": {
            "provider": provider,
            "role": role.map(Role::as_str),
            "has_password": has_password,
        },
        "user_metadata": { "name": "Ayu" },
    })
}

pub fn token_json(user: Value) -> Value {
    json!({
        "access_token": "access-token",
        "refresh_token": "refresh-token",
        "expires_in": 3600,
        "token_type": "bearer",
        "user": user,
    })
}
