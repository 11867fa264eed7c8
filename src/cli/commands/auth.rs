use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::password::{
    PasswordPolicy, DEFAULT_LOCK_DURATION_MINUTES, DEFAULT_MAX_FAILED_ATTEMPTS, DEFAULT_MIN_LENGTH,
};
use crate::token::{DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_EXPIRES_IN: &str = "jwt-expires-in";
pub const ARG_JWT_REFRESH_EXPIRES_IN: &str = "jwt-refresh-expires-in";
pub const ARG_MAX_FAILED_ATTEMPTS: &str = "max-failed-attempts";
pub const ARG_LOCK_DURATION_MINUTES: &str = "lock-duration-minutes";
pub const ARG_PASSWORD_MIN_LENGTH: &str = "password-min-length";
pub const ARG_PASSWORD_REQUIRE_UPPERCASE: &str = "password-require-uppercase";
pub const ARG_PASSWORD_REQUIRE_LOWERCASE: &str = "password-require-lowercase";
pub const ARG_PASSWORD_REQUIRE_DIGIT: &str = "password-require-digit";
pub const ARG_PASSWORD_REQUIRE_SYMBOL: &str = "password-require-symbol";
pub const ARG_BOOTSTRAP_ADMIN_PASSWORD: &str = "bootstrap-admin-password";

/// Parse a lifetime such as `7d`, `12h`, `30m`, `45s` or plain seconds.
fn parse_duration_seconds(value: &str) -> Result<i64, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty duration".to_string());
    }

    let (number, unit) = match value.chars().last() {
        Some(suffix) if suffix.is_ascii_alphabetic() => (
            value[..value.len() - 1].trim(),
            Some(suffix.to_ascii_lowercase()),
        ),
        _ => (value, None),
    };

    let number: i64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    if number < 0 {
        return Err(format!("duration must not be negative: {value}"));
    }

    let seconds = match unit {
        None | Some('s') => Some(number),
        Some('m') => number.checked_mul(60),
        Some('h') => number.checked_mul(3_600),
        Some('d') => number.checked_mul(86_400),
        Some(other) => {
            return Err(format!(
                "invalid duration unit '{other}', expected one of s, m, h, d"
            ));
        }
    };

    seconds.ok_or_else(|| format!("duration out of range: {value}"))
}

#[must_use]
pub fn validator_duration() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<i64, String> {
        parse_duration_seconds(value)
    })
}

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub max_failed_attempts: i32,
    pub lock_duration_minutes: i32,
    pub password_policy: PasswordPolicy,
    pub bootstrap_admin_password: Option<SecretString>,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the JWT secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Filter empty strings which clap passes through when env vars are set to ""
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .filter(|value| !value.trim().is_empty());
        let jwt_secret = match jwt_secret {
            Some(value) => SecretString::from(value),
            None => anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };

        let password_policy = PasswordPolicy::default()
            .with_min_length(
                matches
                    .get_one::<usize>(ARG_PASSWORD_MIN_LENGTH)
                    .copied()
                    .unwrap_or(DEFAULT_MIN_LENGTH),
            )
            .with_require_uppercase(flag(matches, ARG_PASSWORD_REQUIRE_UPPERCASE))
            .with_require_lowercase(flag(matches, ARG_PASSWORD_REQUIRE_LOWERCASE))
            .with_require_digit(flag(matches, ARG_PASSWORD_REQUIRE_DIGIT))
            .with_require_symbol(flag(matches, ARG_PASSWORD_REQUIRE_SYMBOL));

        Ok(Self {
            jwt_secret,
            access_ttl_seconds: matches
                .get_one::<i64>(ARG_JWT_EXPIRES_IN)
                .copied()
                .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_JWT_REFRESH_EXPIRES_IN)
                .copied()
                .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS),
            max_failed_attempts: matches
                .get_one::<i32>(ARG_MAX_FAILED_ATTEMPTS)
                .copied()
                .unwrap_or(DEFAULT_MAX_FAILED_ATTEMPTS),
            lock_duration_minutes: matches
                .get_one::<i32>(ARG_LOCK_DURATION_MINUTES)
                .copied()
                .unwrap_or(DEFAULT_LOCK_DURATION_MINUTES),
            password_policy,
            bootstrap_admin_password: matches
                .get_one::<String>(ARG_BOOTSTRAP_ADMIN_PASSWORD)
                .cloned()
                .filter(|value| !value.trim().is_empty())
                .map(SecretString::from),
        })
    }
}

fn flag(matches: &ArgMatches, id: &str) -> bool {
    matches.get_one::<bool>(id).copied().unwrap_or(true)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_lockout_args(command);
    let command = with_password_args(command);
    with_bootstrap_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign and verify bearer tokens (HS256)")
                .env("JWT_SECRET"),
        )
        .arg(
            Arg::new(ARG_JWT_EXPIRES_IN)
                .long(ARG_JWT_EXPIRES_IN)
                .help("Access token lifetime, e.g. 7d, 12h, 30m or plain seconds")
                .env("JWT_EXPIRES_IN")
                .default_value("7d")
                .value_parser(validator_duration()),
        )
        .arg(
            Arg::new(ARG_JWT_REFRESH_EXPIRES_IN)
                .long(ARG_JWT_REFRESH_EXPIRES_IN)
                .help("Refresh token lifetime, e.g. 30d")
                .env("JWT_REFRESH_EXPIRES_IN")
                .default_value("30d")
                .value_parser(validator_duration()),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_FAILED_ATTEMPTS)
                .long(ARG_MAX_FAILED_ATTEMPTS)
                .help("Failed logins before an account is temporarily locked")
                .env("DEJORO_MAX_FAILED_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new(ARG_LOCK_DURATION_MINUTES)
                .long(ARG_LOCK_DURATION_MINUTES)
                .help("How long a locked account stays locked, in minutes")
                .env("DEJORO_LOCK_DURATION_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(i32)),
        )
}

fn with_password_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PASSWORD_MIN_LENGTH)
                .long(ARG_PASSWORD_MIN_LENGTH)
                .help("Minimum length for new passwords")
                .env("DEJORO_PASSWORD_MIN_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_REQUIRE_UPPERCASE)
                .long(ARG_PASSWORD_REQUIRE_UPPERCASE)
                .help("Require at least one uppercase letter in new passwords")
                .env("DEJORO_PASSWORD_REQUIRE_UPPERCASE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_REQUIRE_LOWERCASE)
                .long(ARG_PASSWORD_REQUIRE_LOWERCASE)
                .help("Require at least one lowercase letter in new passwords")
                .env("DEJORO_PASSWORD_REQUIRE_LOWERCASE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_REQUIRE_DIGIT)
                .long(ARG_PASSWORD_REQUIRE_DIGIT)
                .help("Require at least one digit in new passwords")
                .env("DEJORO_PASSWORD_REQUIRE_DIGIT")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_REQUIRE_SYMBOL)
                .long(ARG_PASSWORD_REQUIRE_SYMBOL)
                .help("Require at least one symbol in new passwords")
                .env("DEJORO_PASSWORD_REQUIRE_SYMBOL")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}

fn with_bootstrap_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_BOOTSTRAP_ADMIN_PASSWORD)
            .long(ARG_BOOTSTRAP_ADMIN_PASSWORD)
            .help("Create the admin account with this password if it does not exist")
            .env("DEJORO_BOOTSTRAP_ADMIN_PASSWORD"),
    )
}
