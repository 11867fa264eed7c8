//! Credential login, token refresh, password management and the federated
//! (SSO) login flow.
//!
//! ## Lockout
//!
//! Failed logins are counted per account with a single atomic UPDATE; once
//! the counter reaches the configured maximum the account locks for the
//! configured duration. The attempt that trips the lock still reports the
//! generic invalid-credentials error, so callers cannot probe the counter.
//!
//! ## Tokens
//!
//! Access and refresh tokens are HS256 JWTs sharing one secret. Refreshing
//! returns a new access token only; the refresh token is never rotated and
//! stays valid until it expires.

pub(crate) mod login;
pub(crate) mod me;
pub(crate) mod password;
pub mod principal;
pub(crate) mod refresh;
pub(crate) mod sso;
mod state;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
