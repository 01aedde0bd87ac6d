use anyhow::bail;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_PROVIDER_URL: &str = "provider-url";
pub const ARG_PROVIDER_ANON_KEY: &str = "provider-anon-key";
pub const ARG_PROVIDER_SERVICE_KEY: &str = "provider-service-key";
pub const ARG_PROVIDER_TIMEOUT_SECONDS: &str = "provider-timeout-seconds";
pub const ARG_OAUTH_PROVIDERS: &str = "oauth-providers";

/// Identity provider connection settings.
#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub anon_key: SecretString,
    pub service_key: SecretString,
    pub timeout_seconds: u64,
    pub oauth_providers: Vec<String>,
}

impl Options {
    /// Parse identity provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let required = |id: &str| -> anyhow::Result<String> {
            match matches.get_one::<String>(id) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => bail!("missing required argument: --{id}"),
            }
        };

        Ok(Self {
            url: required(ARG_PROVIDER_URL)?,
            anon_key: SecretString::from(required(ARG_PROVIDER_ANON_KEY)?),
            service_key: SecretString::from(required(ARG_PROVIDER_SERVICE_KEY)?),
            timeout_seconds: matches
                .get_one::<u64>(ARG_PROVIDER_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
            oauth_providers: matches
                .get_many::<String>(ARG_OAUTH_PROVIDERS)
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROVIDER_URL)
                .long(ARG_PROVIDER_URL)
                .help(
                    "Identity provider auth API base URL, \
                     example: https://auth.staykey.dev/auth/v1",
                )
                .env("STAYKEY_PROVIDER_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PROVIDER_ANON_KEY)
                .long(ARG_PROVIDER_ANON_KEY)
                .help("Public API key sent with every provider request")
                .env("STAYKEY_PROVIDER_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_PROVIDER_SERVICE_KEY)
                .long(ARG_PROVIDER_SERVICE_KEY)
                .help("Service key for privileged provider lookups and metadata writes")
                .env("STAYKEY_PROVIDER_SERVICE_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_PROVIDER_TIMEOUT_SECONDS)
                .long(ARG_PROVIDER_TIMEOUT_SECONDS)
                .help("Upper bound for every provider and directory call")
                .env("STAYKEY_PROVIDER_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OAUTH_PROVIDERS)
                .long(ARG_OAUTH_PROVIDERS)
                .help("Comma separated federated providers offered at sign-in")
                .env("STAYKEY_OAUTH_PROVIDERS")
                .value_delimiter(',')
                .default_value("google"),
        )
}
