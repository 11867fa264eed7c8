//! # Dejoro (Duty Roster Auth Authority)
//!
//! `dejoro` is the authentication and identity authority for the duty roster
//! and room inspection platform. It owns credentials, sessions, role-based
//! authorization, single sign-on federation, and the trusted directory sync
//! gateway the upstream HR system pushes into.
//!
//! ## Credentials & Lockout
//!
//! Passwords are stored as bcrypt hashes (cost 10) and validated against a
//! configurable composition policy (length, upper/lower case, digit, symbol).
//! Five consecutive failures lock an account for thirty minutes; the lock is
//! evaluated lazily on each attempt, so no background job is involved.
//!
//! - **Generic failures:** A wrong password, an unknown username, and the
//!   attempt that triggers the lock all produce the same generic error, so
//!   callers cannot probe for valid usernames.
//! - **Atomic counting:** Failure counting is a single `UPDATE` so concurrent
//!   attempts cannot lose increments.
//!
//! ## Tokens
//!
//! Sessions are stateless HS256 JWTs: a short-lived access token and a
//! longer-lived refresh token carrying a `type: "refresh"` discriminator.
//! Refreshing yields a new access token only; refresh tokens are never
//! rotated and there is no server-side revocation list.
//!
//! ## Federation & Sync
//!
//! External identity providers (OAuth2 today; SAML/CAS records are storable
//! but not interactively driven) map remote profiles onto local accounts
//! keyed by `(external_id, source = sso)`. The sync gateway accepts signed
//! user and organization batches from the HR system, validated by timestamp
//! freshness, app resolution, and an MD5 request signature, applied item by
//! item so one bad record never poisons a batch.

pub mod api;
pub mod cli;
pub mod federation;
pub mod password;
pub mod rbac;
pub mod store;
pub mod sync;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
