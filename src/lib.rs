//! # Staykey (account identity for lodging bookings)
//!
//! `staykey` resolves who a user is before granting access to the booking
//! application. Given an email and the role the user is acting as (`traveler`
//! or `tenant`), it decides whether to authenticate with a password, send the
//! user to a federated provider, resume an interrupted registration, or require
//! a password before granting full access.
//!
//! ## Roles
//!
//! An email is bound to exactly one role for its lifetime. The role is checked
//! before the password: a tenant signing in on the traveler form is told so
//! even with the wrong password.
//!
//! ## Identity provider
//!
//! Credentials live with an external GoTrue-compatible provider. The account
//! directory (Postgres) is a fast cache used for UX decisions; the provider
//! stays the final authority at sign-in time.
//!
//! ## Registration
//!
//! Registration is password-less: a magic link is sent and the password is set
//! on first sign-in. Accounts created that way, or through a federated
//! provider, must set a password before they get full access.

pub mod api;
pub mod cli;
pub mod identity;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with("staykey/"));
        assert!(APP_USER_AGENT.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
