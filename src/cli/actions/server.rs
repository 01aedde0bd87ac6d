use crate::{
    api::{self, handlers::auth::AuthState},
    identity::{
        AuthConfig, AuthService, Collaborators, PendingRoleStore,
        provider::{GoTrueConfig, GoTrueProvider},
    },
    storage::{FilePendingRoleStore, PgStore},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub provider_url: String,
    pub provider_anon_key: SecretString,
    pub provider_service_key: SecretString,
    pub provider_timeout_seconds: u64,
    pub oauth_providers: Vec<String>,
    pub resend_cooldown_seconds: u64,
    pub session_ttl_seconds: u64,
    pub password_min_length: usize,
    pub pending_role_dir: Option<String>,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the database or identity provider client cannot be set
/// up, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Lazy: `/health` reports the directory as down until it is reachable.
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(Duration::from_secs(args.provider_timeout_seconds.max(1)))
        .test_before_acquire(true)
        .connect_lazy(&args.dsn)
        .context("Invalid database connection string")?;
    let store = Arc::new(PgStore::new(pool));

    let pending: Arc<dyn PendingRoleStore> = match &args.pending_role_dir {
        Some(dir) => {
            info!("Keeping pending role selections in {dir}");
            Arc::new(
                FilePendingRoleStore::open(dir)
                    .await
                    .with_context(|| format!("Failed to open pending role directory: {dir}"))?,
            )
        }
        None => store.clone(),
    };

    let provider = GoTrueProvider::new(
        GoTrueConfig::new(
            args.provider_url,
            args.provider_anon_key,
            args.provider_service_key,
        )
        .with_timeout(Duration::from_secs(args.provider_timeout_seconds)),
    )
    .context("Failed to build identity provider client")?;

    let config = AuthConfig::new(args.frontend_base_url)
        .with_resend_cooldown_seconds(args.resend_cooldown_seconds)
        .with_call_timeout_seconds(args.provider_timeout_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_password_min_length(args.password_min_length)
        .with_oauth_providers(args.oauth_providers);
    debug!("Auth config: {:?}", config);

    let service = AuthService::new(
        config,
        Collaborators {
            directory: store.clone(),
            profiles: store,
            pending,
            provider: Arc::new(provider),
        },
    );

    let result = api::new(args.port, Arc::new(AuthState::new(service))).await;
    crate::cli::telemetry::shutdown_tracer();
    result
}
