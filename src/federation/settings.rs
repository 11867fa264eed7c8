//! Per-protocol provider settings.
//!
//! Settings are a tagged enum keyed by `protocol`, parsed and validated when
//! an administrator writes them. Reads therefore never meet an undecodable
//! blob: a decode failure on load indicates real data corruption, not a
//! configuration typo.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    OAuth2,
    Saml,
    Cas,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth2 => "oauth2",
            Self::Saml => "saml",
            Self::Cas => "cas",
        }
    }
}

/// Where each mapped profile field should be read from, overriding the
/// built-in candidate lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMapping {
    pub external_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub real_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Settings {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamlSettings {
    pub entity_id: String,
    pub sso_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasSettings {
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
}

/// Effective credential pair, `appId`/`appSecret` winning over
/// `clientId`/`clientSecret` when both are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppCredentials<'a> {
    pub id: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProviderSettings {
    OAuth2(OAuth2Settings),
    Saml(SamlSettings),
    Cas(CasSettings),
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.trim().is_empty())
}

fn resolve_pair<'a>(
    app_id: Option<&'a String>,
    app_secret: Option<&'a String>,
    client_id: Option<&'a String>,
    client_secret: Option<&'a String>,
) -> Option<AppCredentials<'a>> {
    if let Some(id) = non_empty(app_id) {
        let secret = non_empty(app_secret)?;
        return Some(AppCredentials { id, secret });
    }

    let id = non_empty(client_id)?;
    let secret = non_empty(client_secret)?;

    Some(AppCredentials { id, secret })
}

impl OAuth2Settings {
    #[must_use]
    pub fn credentials(&self) -> Option<AppCredentials<'_>> {
        resolve_pair(
            self.app_id.as_ref(),
            self.app_secret.as_ref(),
            self.client_id.as_ref(),
            self.client_secret.as_ref(),
        )
    }
}

fn check_url(problems: &mut Vec<String>, field: &str, value: &str) {
    if Url::parse(value).is_err() {
        problems.push(format!("{field} must be a valid URL"));
    }
}

impl ProviderSettings {
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::OAuth2(_) => Protocol::OAuth2,
            Self::Saml(_) => Protocol::Saml,
            Self::Cas(_) => Protocol::Cas,
        }
    }

    /// Parse an untyped settings document against the declared protocol tag.
    pub fn parse(value: &serde_json::Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|error| error.to_string())
    }

    /// Structural validation beyond what serde enforces. Returns every
    /// problem found so administrators can fix a document in one pass.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        match self {
            Self::OAuth2(settings) => {
                check_url(
                    &mut problems,
                    "authorizationEndpoint",
                    &settings.authorization_endpoint,
                );
                check_url(&mut problems, "tokenEndpoint", &settings.token_endpoint);
                check_url(
                    &mut problems,
                    "userinfoEndpoint",
                    &settings.userinfo_endpoint,
                );
                check_url(&mut problems, "redirectUri", &settings.redirect_uri);

                if self.credentials().is_none() {
                    problems.push(
                        "either appId/appSecret or clientId/clientSecret must be configured"
                            .to_string(),
                    );
                }
            }
            Self::Saml(settings) => {
                if settings.entity_id.trim().is_empty() {
                    problems.push("entityId must not be empty".to_string());
                }
                check_url(&mut problems, "ssoUrl", &settings.sso_url);
            }
            Self::Cas(settings) => {
                check_url(&mut problems, "serverUrl", &settings.server_url);
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    /// The credential pair used for token exchange and sync trust. The
    /// `appId` pair wins when both pairs are present.
    #[must_use]
    pub fn credentials(&self) -> Option<AppCredentials<'_>> {
        match self {
            Self::OAuth2(s) => s.credentials(),
            Self::Saml(s) => resolve_pair(s.app_id.as_ref(), s.app_secret.as_ref(), None, None),
            Self::Cas(s) => resolve_pair(s.app_id.as_ref(), s.app_secret.as_ref(), None, None),
        }
    }

    /// URL checked by the connectivity probe.
    #[must_use]
    pub fn probe_endpoint(&self) -> &str {
        match self {
            Self::OAuth2(s) => &s.authorization_endpoint,
            Self::Saml(s) => &s.sso_url,
            Self::Cas(s) => &s.server_url,
        }
    }

    /// JSON rendering with secrets replaced, for administrative listings.
    #[must_use]
    pub fn masked(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);

        if let Some(map) = value.as_object_mut() {
            for key in ["appSecret", "clientSecret"] {
                if let Some(slot) = map.get_mut(key) {
                    *slot = serde_json::Value::String("***".to_string());
                }
            }
        }

        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn oauth2_value() -> serde_json::Value {
        json!({
            "protocol": "oauth2",
            "authorizationEndpoint": "https://idp.example.com/oauth/authorize",
            "tokenEndpoint": "https://idp.example.com/oauth/token",
            "userinfoEndpoint": "https://idp.example.com/oauth/userinfo",
            "redirectUri": "https://roster.example.com/sso/callback",
            "appId": "app1",
            "appSecret": "secret"
        })
    }

    #[test]
    fn test_parse_tagged_oauth2_document() {
        let settings = ProviderSettings::parse(&oauth2_value()).unwrap();

        assert_eq!(settings.protocol(), Protocol::OAuth2);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_protocol() {
        let value = json!({"protocol": "ldap", "serverUrl": "https://x"});

        assert!(ProviderSettings::parse(&value).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_required_field() {
        let mut value = oauth2_value();
        value.as_object_mut().unwrap().remove("tokenEndpoint");

        assert!(ProviderSettings::parse(&value).is_err());
    }

    #[test]
    fn test_validate_flags_bad_urls_and_missing_credentials() {
        let value = json!({
            "protocol": "oauth2",
            "authorizationEndpoint": "not a url",
            "tokenEndpoint": "https://idp.example.com/oauth/token",
            "userinfoEndpoint": "https://idp.example.com/oauth/userinfo",
            "redirectUri": "https://roster.example.com/sso/callback"
        });

        let settings = ProviderSettings::parse(&value).unwrap();
        let problems = settings.validate().unwrap_err();

        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("authorizationEndpoint"));
        assert!(problems[1].contains("appId/appSecret"));
    }

    #[test]
    fn test_app_pair_wins_over_client_pair() {
        let mut value = oauth2_value();
        let map = value.as_object_mut().unwrap();
        map.insert("clientId".to_string(), json!("client9"));
        map.insert("clientSecret".to_string(), json!("client-secret"));

        let settings = ProviderSettings::parse(&value).unwrap();
        let credentials = settings.credentials().unwrap();

        assert_eq!(credentials.id, "app1");
        assert_eq!(credentials.secret, "secret");
    }

    #[test]
    fn test_client_pair_used_when_app_pair_absent() {
        let mut value = oauth2_value();
        let map = value.as_object_mut().unwrap();
        map.remove("appId");
        map.remove("appSecret");
        map.insert("clientId".to_string(), json!("client9"));
        map.insert("clientSecret".to_string(), json!("client-secret"));

        let settings = ProviderSettings::parse(&value).unwrap();
        let credentials = settings.credentials().unwrap();

        assert_eq!(credentials.id, "client9");
    }

    #[test]
    fn test_empty_app_id_treated_as_absent() {
        let mut value = oauth2_value();
        let map = value.as_object_mut().unwrap();
        map.insert("appId".to_string(), json!("  "));
        map.insert("clientId".to_string(), json!("client9"));
        map.insert("clientSecret".to_string(), json!("client-secret"));

        let settings = ProviderSettings::parse(&value).unwrap();

        assert_eq!(settings.credentials().unwrap().id, "client9");
    }

    #[test]
    fn test_incomplete_pair_yields_no_credentials() {
        let mut value = oauth2_value();
        value.as_object_mut().unwrap().remove("appSecret");

        let settings = ProviderSettings::parse(&value).unwrap();

        assert!(settings.credentials().is_none());
    }

    #[test]
    fn test_masked_hides_secrets_only() {
        let settings = ProviderSettings::parse(&oauth2_value()).unwrap();
        let masked = settings.masked();

        assert_eq!(masked["appSecret"], "***");
        assert_eq!(masked["appId"], "app1");
        assert_eq!(
            masked["tokenEndpoint"],
            "https://idp.example.com/oauth/token"
        );
    }

    #[test]
    fn test_saml_and_cas_documents_parse() {
        let saml = ProviderSettings::parse(&json!({
            "protocol": "saml",
            "entityId": "urn:example:roster",
            "ssoUrl": "https://idp.example.com/saml/sso",
            "appId": "saml-app",
            "appSecret": "saml-secret"
        }))
        .unwrap();

        assert_eq!(saml.protocol(), Protocol::Saml);
        assert!(saml.validate().is_ok());
        assert_eq!(saml.credentials().unwrap().id, "saml-app");

        let cas = ProviderSettings::parse(&json!({
            "protocol": "cas",
            "serverUrl": "https://cas.example.com"
        }))
        .unwrap();

        assert_eq!(cas.protocol(), Protocol::Cas);
        assert!(cas.validate().is_ok());
        assert!(cas.credentials().is_none());
    }

    #[test]
    fn test_settings_round_trip_preserves_tag() {
        let settings = ProviderSettings::parse(&oauth2_value()).unwrap();
        let serialized = serde_json::to_value(&settings).unwrap();

        assert_eq!(serialized["protocol"], "oauth2");
        assert_eq!(ProviderSettings::parse(&serialized).unwrap(), settings);
    }
}
