//! Request signing: MD5 over `appId + appSecret + timestamp` plus the
//! freshness window that bounds replay.

use chrono::{DateTime, Utc};

/// Accepted clock skew between sender and receiver, in milliseconds.
pub const MAX_SKEW_MS: i64 = 5 * 60 * 1000;

/// Lowercase hex digest of the credential concatenation.
#[must_use]
pub fn compute_signature(app_id: &str, app_secret: &str, timestamp_ms: i64) -> String {
    let digest = md5::compute(format!("{app_id}{app_secret}{timestamp_ms}"));

    format!("{digest:x}")
}

/// Digit-for-digit comparison of the expected digest against the supplied
/// one; hex case does not matter, anything else does.
#[must_use]
pub fn verify_signature(
    app_id: &str,
    app_secret: &str,
    timestamp_ms: i64,
    provided: &str,
) -> bool {
    compute_signature(app_id, app_secret, timestamp_ms).eq_ignore_ascii_case(provided.trim())
}

/// True while the sender timestamp is within the skew window, either side.
#[must_use]
pub fn is_fresh(timestamp_ms: i64, now: DateTime<Utc>) -> bool {
    let skew = now.timestamp_millis().saturating_sub(timestamp_ms);

    skew.abs() <= MAX_SKEW_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // md5("app1" + "secret" + "1700000000000")
    const KNOWN_DIGEST: &str = "8a2da09f9fb54ad131f48589fbd9f5f1";

    #[test]
    fn test_signature_matches_known_digest() {
        assert_eq!(
            compute_signature("app1", "secret", 1_700_000_000_000),
            KNOWN_DIGEST
        );
    }

    #[test]
    fn test_verification_accepts_either_hex_case() {
        assert!(verify_signature(
            "app1",
            "secret",
            1_700_000_000_000,
            KNOWN_DIGEST
        ));
        assert!(verify_signature(
            "app1",
            "secret",
            1_700_000_000_000,
            &KNOWN_DIGEST.to_uppercase()
        ));
        assert!(verify_signature(
            "app1",
            "secret",
            1_700_000_000_000,
            &format!("  {KNOWN_DIGEST}  ")
        ));
    }

    #[test]
    fn test_any_component_mutation_changes_the_digest() {
        assert!(!verify_signature(
            "app2",
            "secret",
            1_700_000_000_000,
            KNOWN_DIGEST
        ));
        assert!(!verify_signature(
            "app1",
            "Secret",
            1_700_000_000_000,
            KNOWN_DIGEST
        ));
        assert!(!verify_signature(
            "app1",
            "secret",
            1_700_000_000_001,
            KNOWN_DIGEST
        ));
    }

    #[test]
    fn test_digest_mutation_is_rejected() {
        let mut corrupted = KNOWN_DIGEST.to_string();
        corrupted.replace_range(0..1, "9");

        assert!(!verify_signature(
            "app1",
            "secret",
            1_700_000_000_000,
            &corrupted
        ));
    }

    #[test]
    fn test_freshness_window_is_inclusive_both_sides() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        assert!(is_fresh(1_700_000_000_000, now));
        assert!(is_fresh(1_700_000_000_000 - MAX_SKEW_MS, now));
        assert!(is_fresh(1_700_000_000_000 + MAX_SKEW_MS, now));
        assert!(!is_fresh(1_700_000_000_000 - MAX_SKEW_MS - 1, now));
        assert!(!is_fresh(1_700_000_000_000 + MAX_SKEW_MS + 1, now));
    }

    #[test]
    fn test_signatures_from_different_apps_differ() {
        let a = compute_signature("roster-hr", "topsecret", 1_700_000_300_000);
        let b = compute_signature("roster-hr2", "topsecret", 1_700_000_300_000);

        assert_eq!(a, "36a72b86bcdc3c53282dae84e0059c1f");
        assert_ne!(a, b);
    }
}
