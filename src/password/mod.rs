//! Credential hashing, composition policy and lockout arithmetic.
//!
//! Hashes are bcrypt at cost 10. Verification against a missing hash burns a
//! comparison against a fixed dummy hash so federated-only accounts and
//! unknown usernames cost the same as a wrong password.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::OnceLock;

pub const BCRYPT_COST: u32 = 10;

pub const DEFAULT_MIN_LENGTH: usize = 8;
pub const DEFAULT_MAX_FAILED_ATTEMPTS: i32 = 5;
pub const DEFAULT_LOCK_DURATION_MINUTES: i32 = 30;

/// Characters accepted as the "symbol" class of the composition policy.
pub const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:'\",.<>/?`~\\";

fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();

    DUMMY.get_or_init(|| bcrypt::hash("dejoro-timing-pad", BCRYPT_COST).unwrap_or_default())
}

/// Hash a plaintext password for storage.
pub fn hash_password(plain: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plain, BCRYPT_COST)
}

/// Compare a plaintext password against a stored hash.
///
/// `None` (no credential on record) always fails, after a dummy comparison
/// that keeps the timing in line with a real mismatch.
#[must_use]
pub fn verify_password(plain: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(hash) => bcrypt::verify(plain, hash).unwrap_or(false),
        None => {
            let _ = bcrypt::verify(plain, dummy_hash());
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    TooShort(usize),
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSymbol,
}

impl PolicyViolation {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::TooShort(min) => format!("Password must be at least {min} characters long"),
            Self::MissingUppercase => "Password must contain an uppercase letter".to_string(),
            Self::MissingLowercase => "Password must contain a lowercase letter".to_string(),
            Self::MissingDigit => "Password must contain a digit".to_string(),
            Self::MissingSymbol => "Password must contain a symbol".to_string(),
        }
    }
}

/// Composition rules applied to new passwords, checked in a fixed order with
/// the first violation reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    min_length: usize,
    require_uppercase: bool,
    require_lowercase: bool,
    require_digit: bool,
    require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_symbol: true,
        }
    }
}

impl PasswordPolicy {
    #[must_use]
    pub const fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    #[must_use]
    pub const fn with_require_uppercase(mut self, required: bool) -> Self {
        self.require_uppercase = required;
        self
    }

    #[must_use]
    pub const fn with_require_lowercase(mut self, required: bool) -> Self {
        self.require_lowercase = required;
        self
    }

    #[must_use]
    pub const fn with_require_digit(mut self, required: bool) -> Self {
        self.require_digit = required;
        self
    }

    #[must_use]
    pub const fn with_require_symbol(mut self, required: bool) -> Self {
        self.require_symbol = required;
        self
    }

    /// Check a candidate password, failing fast on the first violated rule.
    pub fn validate(&self, candidate: &str) -> Result<(), PolicyViolation> {
        if candidate.chars().count() < self.min_length {
            return Err(PolicyViolation::TooShort(self.min_length));
        }

        if self.require_uppercase && !candidate.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(PolicyViolation::MissingUppercase);
        }

        if self.require_lowercase && !candidate.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(PolicyViolation::MissingLowercase);
        }

        if self.require_digit && !candidate.chars().any(|c| c.is_ascii_digit()) {
            return Err(PolicyViolation::MissingDigit);
        }

        if self.require_symbol && !candidate.chars().any(|c| SYMBOLS.contains(c)) {
            return Err(PolicyViolation::MissingSymbol);
        }

        Ok(())
    }
}

/// Minutes left on an active lock, rounded up. `None` once the lock expired.
#[must_use]
pub fn remaining_lock_minutes(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let remaining = locked_until - now;

    if remaining > TimeDelta::zero() {
        Some((remaining.num_seconds() + 59) / 60)
    } else {
        None
    }
}
