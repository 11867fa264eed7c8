//! Auth configuration and the shared state handed to every handler.

use anyhow::{Context, Result};
use secrecy::SecretString;

use crate::federation::FederationClient;
use crate::password::{
    PasswordPolicy, DEFAULT_LOCK_DURATION_MINUTES, DEFAULT_MAX_FAILED_ATTEMPTS,
};
use crate::token::{TokenService, DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS};

#[derive(Clone, Debug)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    max_failed_attempts: i32,
    lock_duration_minutes: i32,
    password_policy: PasswordPolicy,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lock_duration_minutes: DEFAULT_LOCK_DURATION_MINUTES,
            password_policy: PasswordPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: i32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lock_duration_minutes(mut self, minutes: i32) -> Self {
        self.lock_duration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> i32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lock_duration_minutes(&self) -> i32 {
        self.lock_duration_minutes
    }

    #[must_use]
    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.password_policy
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    federation: FederationClient,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Result<Self> {
        let federation =
            FederationClient::new().context("failed to build the federation HTTP client")?;

        Ok(Self::with_federation(config, federation))
    }

    /// Same state with a caller-supplied upstream client.
    #[must_use]
    pub fn with_federation(config: AuthConfig, federation: FederationClient) -> Self {
        let tokens = TokenService::new(
            config.jwt_secret(),
            config.access_ttl_seconds(),
            config.refresh_ttl_seconds(),
        );

        Self {
            config,
            tokens,
            federation,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn federation(&self) -> &FederationClient {
        &self.federation
    }
}
