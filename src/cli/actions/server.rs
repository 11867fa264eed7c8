use crate::api;
use crate::api::handlers::auth::AuthConfig;
use crate::password::PasswordPolicy;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub max_failed_attempts: i32,
    pub lock_duration_minutes: i32,
    pub password_policy: PasswordPolicy,
    pub bootstrap_admin_password: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.jwt_secret)
        .with_access_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_ttl_seconds)
        .with_max_failed_attempts(args.max_failed_attempts)
        .with_lock_duration_minutes(args.lock_duration_minutes)
        .with_password_policy(args.password_policy);

    api::new(
        args.port,
        args.dsn,
        auth_config,
        args.bootstrap_admin_password,
    )
    .await
}
