//! Outbound OAuth2 plumbing: authorization URL construction, the
//! code-for-token exchange, the Bearer user-info fetch, and the
//! administrative reachability probe.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::{header, Client};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};
use url::Url;
use utoipa::ToSchema;

use crate::federation::settings::{OAuth2Settings, ProviderSettings};
use crate::federation::FederationError;

pub const DEFAULT_SCOPE: &str = "openid profile email";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Random, URL-safe state for callers that do not supply their own.
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);

    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization redirect URL for an interactive login.
pub fn authorize_url(settings: &OAuth2Settings, state: &str) -> Result<Url, FederationError> {
    let credentials = settings
        .credentials()
        .ok_or_else(|| FederationError::Misconfigured("no credential pair configured".to_string()))?;

    let mut url = Url::parse(&settings.authorization_endpoint)
        .map_err(|error| FederationError::Misconfigured(error.to_string()))?;

    {
        let mut pairs = url.query_pairs_mut();

        pairs.append_pair("client_id", credentials.id);
        pairs.append_pair("response_type", "code");
        pairs.append_pair("redirect_uri", &settings.redirect_uri);
        pairs.append_pair("scope", settings.scope.as_deref().unwrap_or(DEFAULT_SCOPE));
        pairs.append_pair("state", state);

        if let Some(extra) = &settings.extra_params {
            for (key, value) in extra {
                pairs.append_pair(key, value);
            }
        }
    }

    Ok(url)
}

/// Result of probing a provider endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProbeReport {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub struct FederationClient {
    http: Client,
}

impl FederationClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self { http })
    }

    #[must_use]
    pub fn with_http(http: Client) -> Self {
        Self { http }
    }

    /// Exchange an authorization code for the provider's access token.
    pub async fn exchange_code(
        &self,
        settings: &OAuth2Settings,
        code: &str,
    ) -> Result<String, FederationError> {
        let credentials = settings.credentials().ok_or_else(|| {
            FederationError::Misconfigured("no credential pair configured".to_string())
        })?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("client_id", credentials.id),
            ("client_secret", credentials.secret),
        ];

        let span = info_span!(
            "idp.token_exchange",
            http.method = "POST",
            url = %settings.token_endpoint
        );
        let response = self
            .http
            .post(&settings.token_endpoint)
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .instrument(span)
            .await
            .map_err(|error| FederationError::TokenExchange(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| FederationError::TokenExchange(error.to_string()))?;

        if !status.is_success() {
            debug!("token endpoint returned {status}: {body}");

            return Err(FederationError::TokenExchange(format!(
                "token endpoint returned {status}"
            )));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|error| {
            FederationError::TokenExchange(format!("malformed token response: {error}"))
        })?;

        payload
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                FederationError::TokenExchange("response carried no access_token".to_string())
            })
    }

    /// Fetch the raw user-info document with the provider's access token.
    pub async fn fetch_profile(
        &self,
        settings: &OAuth2Settings,
        access_token: &str,
    ) -> Result<Value, FederationError> {
        let span = info_span!(
            "idp.userinfo",
            http.method = "GET",
            url = %settings.userinfo_endpoint
        );
        let response = self
            .http
            .get(&settings.userinfo_endpoint)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .send()
            .instrument(span)
            .await
            .map_err(|error| FederationError::ProfileFetch(error.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("userinfo endpoint returned {status}: {body}");

            return Err(FederationError::ProfileFetch(format!(
                "userinfo endpoint returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|error| FederationError::ProfileFetch(error.to_string()))
    }

    /// Reachability check used by the administrative test endpoint. Any HTTP
    /// answer counts as reachable; only transport failures do not.
    pub async fn probe(&self, settings: &ProviderSettings) -> ProbeReport {
        let endpoint = settings.probe_endpoint();

        let span = info_span!("idp.probe", http.method = "GET", url = %endpoint);
        match self.http.get(endpoint).send().instrument(span).await {
            Ok(response) => ProbeReport {
                reachable: true,
                status: Some(response.status().as_u16()),
                detail: None,
            },
            Err(error) => ProbeReport {
                reachable: false,
                status: error.status().map(|status| status.as_u16()),
                detail: Some(error.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::settings::FieldMapping;
    use std::collections::BTreeMap;
    use std::net::TcpListener;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn settings(base: &str) -> OAuth2Settings {
        OAuth2Settings {
            authorization_endpoint: format!("{base}/oauth/authorize"),
            token_endpoint: format!("{base}/oauth/token"),
            userinfo_endpoint: format!("{base}/oauth/userinfo"),
            redirect_uri: "https://roster.example.com/sso/callback".to_string(),
            scope: None,
            app_id: Some("app1".to_string()),
            app_secret: Some("secret".to_string()),
            client_id: None,
            client_secret: None,
            extra_params: None,
            mapping: None,
        }
    }

    #[test]
    fn test_authorize_url_carries_standard_parameters() {
        let url = authorize_url(&settings("https://idp.example.com"), "state-123").unwrap();

        assert!(url.as_str().starts_with("https://idp.example.com/oauth/authorize?"));

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(pairs.contains(&("client_id".to_string(), "app1".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("scope".to_string(), DEFAULT_SCOPE.to_string())));
        assert!(pairs.contains(&("state".to_string(), "state-123".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://roster.example.com/sso/callback".to_string()
        )));
    }

    #[test]
    fn test_authorize_url_appends_extra_params_and_custom_scope() {
        let mut custom = settings("https://idp.example.com");
        custom.scope = Some("basic".to_string());
        custom.extra_params = Some(BTreeMap::from([
            ("agentid".to_string(), "1000002".to_string()),
            ("prompt".to_string(), "consent".to_string()),
        ]));

        let url = authorize_url(&custom, "s").unwrap();
        let query = url.query().unwrap();

        assert!(query.contains("scope=basic"));
        assert!(query.contains("agentid=1000002"));
        assert!(query.contains("prompt=consent"));
    }

    #[test]
    fn test_authorize_url_without_credentials_is_misconfigured() {
        let mut broken = settings("https://idp.example.com");
        broken.app_id = None;
        broken.app_secret = None;

        assert!(matches!(
            authorize_url(&broken, "s"),
            Err(FederationError::Misconfigured(_))
        ));
    }

    #[test]
    fn test_generated_state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();

        assert_ne!(a, b);
        assert!(a.len() >= 32);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_exchange_code_returns_access_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("client_id=app1"))
            .and(body_string_contains("client_secret=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "remote-token",
                "token_type": "bearer",
                "expires_in": 7200
            })))
            .mount(&server)
            .await;

        let client = FederationClient::new().unwrap();
        let token = client
            .exchange_code(&settings(&server.uri()), "abc123")
            .await
            .unwrap();

        assert_eq!(token, "remote-token");
    }

    #[tokio::test]
    async fn test_exchange_code_maps_upstream_failure() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let client = FederationClient::new().unwrap();
        let result = client.exchange_code(&settings(&server.uri()), "bad").await;

        assert!(matches!(result, Err(FederationError::TokenExchange(_))));
    }

    #[tokio::test]
    async fn test_exchange_code_rejects_response_without_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let client = FederationClient::new().unwrap();
        let result = client.exchange_code(&settings(&server.uri()), "abc").await;

        assert!(matches!(result, Err(FederationError::TokenExchange(_))));
    }

    #[tokio::test]
    async fn test_fetch_profile_sends_bearer_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/userinfo"))
            .and(header("authorization", "Bearer remote-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "u-1001",
                "email": "jsmith@example.com"
            })))
            .mount(&server)
            .await;

        let client = FederationClient::new().unwrap();
        let profile = client
            .fetch_profile(&settings(&server.uri()), "remote-token")
            .await
            .unwrap();

        assert_eq!(profile["sub"], "u-1001");
    }

    #[tokio::test]
    async fn test_fetch_profile_maps_upstream_failure() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = FederationClient::new().unwrap();
        let result = client
            .fetch_profile(&settings(&server.uri()), "expired")
            .await;

        assert!(matches!(result, Err(FederationError::ProfileFetch(_))));
    }

    #[tokio::test]
    async fn test_probe_reports_http_answers_as_reachable() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(302))
            .mount(&server)
            .await;

        let client = FederationClient::new().unwrap();
        let mut oauth2 = settings(&server.uri());
        oauth2.mapping = Some(FieldMapping::default());
        let report = client.probe(&ProviderSettings::OAuth2(oauth2)).await;

        assert!(report.reachable);
        assert_eq!(report.status, Some(302));
    }

    #[tokio::test]
    async fn test_probe_reports_transport_failure() {
        let client = FederationClient::new().unwrap();
        let report = client
            .probe(&ProviderSettings::OAuth2(settings("http://127.0.0.1:1")))
            .await;

        assert!(!report.reachable);
        assert!(report.detail.is_some());
    }
}
