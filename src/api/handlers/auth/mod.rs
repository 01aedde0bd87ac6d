//! Auth handlers.
//!
//! These endpoints are a thin HTTP layer over [`crate::identity::AuthService`].
//! Every outcome, success or failure, is returned as JSON with an `outcome`
//! tag.
//!
//! ## Cookies
//!
//! - `staykey_session`: opaque random token. Only its SHA-256 hash is kept
//!   server side, next to the provider session it stands for.
//! - `staykey_browser`: key scoping the role picked before a federated
//!   sign-in, so the callback can bind it after the full page navigation.

pub(crate) mod email;
pub(crate) mod login;
pub(crate) mod oauth;
pub(crate) mod password;
pub(crate) mod registration;
pub(crate) mod session;
mod state;
pub(crate) mod types;
mod utils;

pub use state::AuthState;
