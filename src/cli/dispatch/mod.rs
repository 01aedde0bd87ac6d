//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, provider};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or blank.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty())
        .context("missing required argument: --dsn")?;

    let provider_opts = provider::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        provider_url: provider_opts.url,
        provider_anon_key: provider_opts.anon_key,
        provider_service_key: provider_opts.service_key,
        provider_timeout_seconds: provider_opts.timeout_seconds,
        oauth_providers: provider_opts.oauth_providers,
        resend_cooldown_seconds: auth_opts.resend_cooldown_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        password_min_length: auth_opts.password_min_length,
        pending_role_dir: auth_opts.pending_role_dir,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const ENV: [(&str, Option<&str>); 6] = [
        ("STAYKEY_DSN", Some("postgres://staykey@localhost:5432/staykey")),
        ("STAYKEY_PROVIDER_URL", Some("https://auth.staykey.dev/auth/v1")),
        ("STAYKEY_PROVIDER_ANON_KEY", Some("anon")),
        ("STAYKEY_PROVIDER_SERVICE_KEY", Some("service")),
        ("STAYKEY_OAUTH_PROVIDERS", Some("Google, GitHub")),
        ("STAYKEY_PENDING_ROLE_DIR", Some("")),
    ];

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(ENV, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["staykey"]);
            let result = handler(&matches);
            assert!(result.is_ok());
            if let Ok(Action::Server(args)) = result {
                assert_eq!(args.port, 8080);
                assert_eq!(args.provider_service_key.expose_secret(), "service");
                assert_eq!(args.oauth_providers.len(), 2);
                assert_eq!(args.session_ttl_seconds, 43_200);
                assert_eq!(args.pending_role_dir, None);
            }
        });
    }

    #[test]
    fn blank_provider_url_is_rejected() {
        temp_env::with_vars(ENV, || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "staykey",
                "--provider-url",
                " ",
            ]);
            let result = handler(&matches);
            assert!(
                result
                    .err()
                    .is_some_and(|err| err
                        .to_string()
                        .contains("missing required argument: --provider-url"))
            );
        });
    }
}
