pub mod auth;
pub mod health;
pub mod root;
pub mod sso_admin;
pub mod sync;
