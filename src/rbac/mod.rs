//! Role and permission checks.
//!
//! Permission checks require every named code (AND); role checks require at
//! least one (OR). Role and permission sets are loaded fresh from the
//! database when the principal is resolved, so grants take effect without
//! re-login.

use uuid::Uuid;

/// Roles that clear the self-or-admin gate for any target.
pub const ADMIN_ROLES: &[&str] = &["admin"];

/// An authenticated caller with its effective role and permission codes.
#[derive(Debug, Clone)]
pub struct Principal {
    pub account_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl Principal {
    /// True when every required permission code is held.
    #[must_use]
    pub fn has_all_permissions(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|code| self.permissions.iter().any(|held| held == code))
    }

    /// True when at least one of the required roles is held.
    #[must_use]
    pub fn has_any_role(&self, required: &[&str]) -> bool {
        required
            .iter()
            .any(|code| self.roles.iter().any(|held| held == code))
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_any_role(ADMIN_ROLES)
    }

    /// Self-or-admin: the caller may act on its own account, admins on any.
    #[must_use]
    pub fn may_act_on(&self, target: Uuid) -> bool {
        self.account_id == target || self.is_admin()
    }
}
