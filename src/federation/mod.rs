//! Identity federation: provider settings, the OAuth2 login flow, and
//! profile-to-account mapping.

pub mod client;
pub mod mapping;
pub mod service;
pub mod settings;

pub use client::FederationClient;

/// Failures of the federation login flow. Messages here are internal
/// diagnostics; the HTTP layer logs them and answers with generic wording.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FederationError {
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("user profile fetch failed: {0}")]
    ProfileFetch(String),
    #[error("profile is missing a usable external identity")]
    UnmappableIdentity,
    #[error("provider configuration is unusable: {0}")]
    Misconfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_detail() {
        let error = FederationError::TokenExchange("status 503".to_string());

        assert!(error.to_string().contains("status 503"));
        assert_eq!(
            FederationError::UnmappableIdentity.to_string(),
            "profile is missing a usable external identity"
        );
    }
}
