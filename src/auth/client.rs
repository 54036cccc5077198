use super::TokenSource;
use crate::http::{self, ORIGIN, REFERER};
use crate::models::{Endpoints, SignUpRequest, SignUpResponse};
use crate::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

static APP_BUNDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_app-(\w+)").expect("valid bundle regex"));
static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(AI\w+)""#).expect("valid api key regex"));

const SIGN_UP_TIMEOUT: Duration = Duration::from_secs(20);

/// Scrapes the public API key out of the web app's JS bundle and trades it
/// for an anonymous id token.
///
/// The scraping is tied to the site's current markup. Everything that depends
/// on it stays in this file.
pub struct DreamTokenSource {
    client: Client,
    endpoints: Endpoints,
}

impl DreamTokenSource {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    async fn fetch_bundle_name(&self) -> Result<String> {
        let html = http::send_for_text(
            self.client.get(&self.endpoints.discovery_url),
            "bundle discovery",
        )
        .await
        .map_err(|e| Error::Auth(format!("Failed to load discovery page: {}", e)))?;

        find_bundle_name(&html)
            .map(str::to_string)
            .ok_or_else(|| Error::Auth("No _app bundle referenced on discovery page".to_string()))
    }

    async fn fetch_api_key(&self) -> Result<String> {
        let bundle = self.fetch_bundle_name().await?;
        let url = format!(
            "{}/_app-{}.js",
            self.endpoints.script_base_url.trim_end_matches('/'),
            bundle
        );
        tracing::debug!("Scanning {} for embedded API key", url);

        let script = http::send_for_text(self.client.get(&url), "app bundle")
            .await
            .map_err(|e| Error::Auth(format!("Failed to load app bundle: {}", e)))?;

        find_api_key(&script)
            .map(str::to_string)
            .ok_or_else(|| Error::Auth("No API key found in app bundle".to_string()))
    }
}

fn find_bundle_name(html: &str) -> Option<&str> {
    APP_BUNDLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn find_api_key(script: &str) -> Option<&str> {
    API_KEY_RE
        .captures(script)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[async_trait]
impl TokenSource for DreamTokenSource {
    async fn fetch_token(&self) -> Result<String> {
        let api_key = self.fetch_api_key().await?;

        let request = self
            .client
            .post(&self.endpoints.auth_url)
            .query(&[("key", api_key.as_str())])
            .header("Origin", ORIGIN)
            .header("Referer", REFERER)
            .timeout(SIGN_UP_TIMEOUT)
            .json(&SignUpRequest {
                return_secure_token: true,
            });

        let body = http::send_for_text(request, "token exchange")
            .await
            .map_err(|e| Error::Auth(format!("Token exchange failed: {}", e)))?;

        let response: SignUpResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse token response: {}\nBody: {}", e, body);
            Error::Auth(format!("Failed to parse token response: {}", e))
        })?;

        let token = response
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("Token response has no idToken".to_string()))?;

        tracing::info!("Obtained new bearer token");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BUNDLE_HTML: &str = r#"<script src="/_next/static/chunks/pages/_app-3f9c2ab1.js" defer></script>"#;
    const BUNDLE_JS: &str = r#"var cfg={apiKey:"AIzaSyTestKey_123",authDomain:"dream.ai"};"#;

    async fn mount_discovery(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BUNDLE_HTML))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_next/static/chunks/pages/_app-3f9c2ab1.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BUNDLE_JS))
            .mount(server)
            .await;
    }

    fn make_source(server: &MockServer) -> DreamTokenSource {
        DreamTokenSource::new(Client::new(), Endpoints::with_base_url(&server.uri()))
    }

    #[test]
    fn test_find_bundle_name() {
        assert_eq!(find_bundle_name(BUNDLE_HTML), Some("3f9c2ab1"));
        assert_eq!(find_bundle_name("<html></html>"), None);
    }

    #[test]
    fn test_find_api_key() {
        assert_eq!(find_api_key(BUNDLE_JS), Some("AIzaSyTestKey_123"));
        assert_eq!(find_api_key(r#"var k="BIzaNope";"#), None);
    }

    #[tokio::test]
    async fn test_fetch_token_full_exchange() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .and(query_param("key", "AIzaSyTestKey_123"))
            .and(body_json(serde_json::json!({ "returnSecureToken": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "idToken": "bearer-abc", "kind": "x" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = make_source(&server).fetch_token().await.unwrap();
        assert_eq!(token, "bearer-abc");
    }

    #[tokio::test]
    async fn test_missing_id_token_is_auth_error() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "refreshToken": "r" })),
            )
            .mount(&server)
            .await;

        let err = make_source(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(msg) if msg.contains("idToken")));
    }

    #[tokio::test]
    async fn test_exchange_http_error_is_auth_error() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/accounts:signUp"))
            .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = make_source(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_missing_bundle_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = make_source(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(msg) if msg.contains("_app")));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BUNDLE_HTML))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_next/static/chunks/pages/_app-3f9c2ab1.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("var nothing=1;"))
            .mount(&server)
            .await;

        let err = make_source(&server).fetch_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(msg) if msg.contains("API key")));
    }
}
