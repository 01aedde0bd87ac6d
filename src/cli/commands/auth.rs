use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_RESEND_COOLDOWN_SECONDS: &str = "resend-cooldown-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_PASSWORD_MIN_LENGTH: &str = "password-min-length";
pub const ARG_PENDING_ROLE_DIR: &str = "pending-role-dir";

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub resend_cooldown_seconds: u64,
    pub session_ttl_seconds: u64,
    pub password_min_length: usize,
    pub pending_role_dir: Option<String>,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the frontend base URL is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_FRONTEND_BASE_URL}")
            })?;

        Ok(Self {
            frontend_base_url,
            resend_cooldown_seconds: matches
                .get_one::<u64>(ARG_RESEND_COOLDOWN_SECONDS)
                .copied()
                .unwrap_or(10),
            session_ttl_seconds: matches
                .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(43_200),
            password_min_length: matches
                .get_one::<usize>(ARG_PASSWORD_MIN_LENGTH)
                .copied()
                .unwrap_or(8),
            // Empty env values fall back to the database store.
            pending_role_dir: matches
                .get_one::<String>(ARG_PENDING_ROLE_DIR)
                .cloned()
                .filter(|value| !value.trim().is_empty()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_frontend_args(command);
    with_credential_args(command)
}

fn with_frontend_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for redirect links and the CORS origin")
                .env("STAYKEY_FRONTEND_BASE_URL")
                .default_value("https://staykey.dev"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("STAYKEY_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_PENDING_ROLE_DIR)
                .long(ARG_PENDING_ROLE_DIR)
                .help(
                    "Keep pending OAuth role selections as files in this directory \
                     instead of the database",
                )
                .env("STAYKEY_PENDING_ROLE_DIR"),
        )
}

fn with_credential_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RESEND_COOLDOWN_SECONDS)
                .long(ARG_RESEND_COOLDOWN_SECONDS)
                .help("Cooldown before another verification email may be sent")
                .env("STAYKEY_RESEND_COOLDOWN_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_MIN_LENGTH)
                .long(ARG_PASSWORD_MIN_LENGTH)
                .help("Minimum length of a newly set password")
                .env("STAYKEY_PASSWORD_MIN_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
}
