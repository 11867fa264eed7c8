//! Persistence layer: repository structs with associated async functions
//! over a shared `PgPool`, runtime-bound queries wrapped in `db.query` spans.

pub mod accounts;
pub mod orgs;
pub mod providers;
pub mod sync_logs;

/// True when the error is a Postgres unique-constraint violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_error) = error {
        db_error.code().as_deref() == Some("23505")
    } else {
        false
    }
}
