//! Profile field mapping.
//!
//! Each target field walks an ordered candidate list: the configured
//! override first, then the built-in defaults. A candidate is skipped only
//! when the key is absent or its value is an empty string; numeric `0` and
//! boolean `false` are legitimate identifiers and survive conversion.

use serde_json::Value;

use crate::federation::settings::FieldMapping;
use crate::federation::FederationError;

pub const EXTERNAL_ID_CANDIDATES: &[&str] = &["sub", "id", "oid", "uid"];
pub const USERNAME_CANDIDATES: &[&str] = &["username", "preferred_username", "login"];
pub const EMAIL_CANDIDATES: &[&str] = &["email", "mail"];
pub const REAL_NAME_CANDIDATES: &[&str] = &["name", "displayName", "nickname"];
pub const PHONE_CANDIDATES: &[&str] = &["phone", "phoneNumber", "mobile"];

/// A remote profile reduced to the fields an account stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedProfile {
    pub external_id: String,
    pub username: String,
    pub email: Option<String>,
    pub real_name: Option<String>,
    pub phone: Option<String>,
}

fn field_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn extract(profile: &Value, configured: Option<&str>, defaults: &[&str]) -> Option<String> {
    let candidates = configured.into_iter().chain(defaults.iter().copied());

    for key in candidates {
        if let Some(value) = profile.get(key) {
            if let Some(text) = field_as_string(value) {
                return Some(text);
            }
        }
    }

    None
}

/// Map a raw user-info document onto account fields.
///
/// The external identity is mandatory; a profile without one cannot be
/// attached to an account. The username falls back to the external id so
/// created accounts always have one.
pub fn map_profile(
    profile: &Value,
    mapping: Option<&FieldMapping>,
) -> Result<MappedProfile, FederationError> {
    let mapping = mapping.cloned().unwrap_or_default();

    let external_id = extract(
        profile,
        mapping.external_id.as_deref(),
        EXTERNAL_ID_CANDIDATES,
    )
    .ok_or(FederationError::UnmappableIdentity)?;

    let username = extract(profile, mapping.username.as_deref(), USERNAME_CANDIDATES)
        .unwrap_or_else(|| external_id.clone());

    Ok(MappedProfile {
        username,
        email: extract(profile, mapping.email.as_deref(), EMAIL_CANDIDATES),
        real_name: extract(profile, mapping.real_name.as_deref(), REAL_NAME_CANDIDATES),
        phone: extract(profile, mapping.phone.as_deref(), PHONE_CANDIDATES),
        external_id,
    })
}
