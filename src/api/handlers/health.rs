use super::auth::AuthState;
use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    identity_provider: String,
}

const fn status_str(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (
            status = 200,
            description = "Account directory and identity provider are healthy",
            body = Health
        ),
        (
            status = 503,
            description = "Account directory or identity provider is unhealthy",
            body = Health
        )
    ),
    tag= "health"
)]
pub async fn health(method: Method, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let directory_span = info_span!("directory.ping", db.system = "postgresql");
    let database = match auth_state
        .service()
        .directory_health()
        .instrument(directory_span)
        .await
    {
        Ok(()) => true,
        Err(err) => {
            error!("Failed to ping account directory: {err}");
            false
        }
    };

    let provider_span = info_span!("identity_provider.health");
    let identity_provider = match auth_state
        .service()
        .provider_health()
        .instrument(provider_span)
        .await
    {
        Ok(()) => true,
        Err(err) => {
            error!("Failed to reach identity provider: {err}");
            false
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_str(database).to_string(),
        identity_provider: status_str(identity_provider).to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = health.commit.get(..7).unwrap_or_default();
    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            error!("Failed to parse X-App header: {err}");
            HeaderMap::new()
        });

    if database && identity_provider {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(status_str(true), "ok");
        assert_eq!(status_str(false), "error");
    }
}
