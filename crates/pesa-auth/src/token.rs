//! OAuth client-credentials refresh.

use std::sync::Arc;

use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::CredentialCache;
use crate::errors::AuthError;

/// Lifetime assumed when the token endpoint omits or garbles `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

/// The gateway sends `expires_in` as a string; tolerate a number too.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Number(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Hands out gateway access tokens, refreshing through the OAuth endpoint
/// when the shared [`CredentialCache`] has none.
pub struct TokenProvider {
    http: reqwest::Client,
    oauth_url: String,
    consumer_key: String,
    consumer_secret: String,
    cache: Arc<CredentialCache>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("oauth_url", &self.oauth_url)
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Create a provider that refreshes against `oauth_url` with HTTP Basic
    /// `consumer_key:consumer_secret`.
    pub fn new(
        http: reqwest::Client,
        oauth_url: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        cache: Arc<CredentialCache>,
    ) -> Self {
        Self {
            http,
            oauth_url: oauth_url.into(),
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            cache,
        }
    }

    /// The shared cache this provider writes into.
    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Return a usable access token.
    ///
    /// Serves from the cache unless `force_refresh` is set or the cached
    /// token is absent or expired.
    #[tracing::instrument(skip_all, fields(force_refresh = force_refresh))]
    pub async fn access_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        if !force_refresh {
            if let Some(token) = self.cache.get() {
                return Ok(token);
            }
        }

        let (token, expires_in) = self.fetch().await?;
        self.cache.set(token.clone(), expires_in);
        counter!("gateway_token_refresh_total").increment(1);
        info!(expires_in, "gateway access token refreshed");
        Ok(token)
    }

    /// Drop the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        debug!("invalidating cached gateway token");
        self.cache.clear();
    }

    async fn fetch(&self) -> Result<(String, u64), AuthError> {
        if self.consumer_key.is_empty() || self.consumer_secret.is_empty() {
            return Err(AuthError::NotConfigured(
                "consumer key and secret are required".into(),
            ));
        }

        let resp = self
            .http
            .get(&self.oauth_url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, "token endpoint rejected request");
            return Err(AuthError::OAuth { status, message });
        }

        let body = resp.bytes().await?;
        let data: TokenResponse = serde_json::from_slice(&body)?;
        if data.access_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        let expires_in = data
            .expires_in
            .as_ref()
            .and_then(ExpiresIn::seconds)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Ok((data.access_token, expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OAUTH_PATH: &str = "/oauth/v1/generate";

    fn provider(server: &MockServer) -> TokenProvider {
        TokenProvider::new(
            reqwest::Client::new(),
            format!("{}{OAUTH_PATH}?grant_type=client_credentials", server.uri()),
            "key",
            "secret",
            Arc::new(CredentialCache::new()),
        )
    }

    async fn mount_token(server: &MockServer, token: &str, expires_in: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(OAUTH_PATH))
            .and(query_param("grant_type", "client_credentials"))
            .and(header("authorization", "Basic a2V5OnNlY3JldA=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "expires_in": expires_in,
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn expires_in_parsing() {
        assert_eq!(ExpiresIn::Number(10).seconds(), Some(10));
        assert_eq!(ExpiresIn::Text("3599".into()).seconds(), Some(3599));
        assert_eq!(ExpiresIn::Text("soon".into()).seconds(), None);
    }

    #[tokio::test]
    async fn fetches_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OAUTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "expires_in": "3599",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert_eq!(provider.access_token(false).await.unwrap(), "tok-1");
        // Second call is served from the cache; `expect(1)` verifies on drop.
        assert_eq!(provider.access_token(false).await.unwrap(), "tok-1");
        assert_eq!(provider.cache().get().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn sends_basic_auth_and_grant_type() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-basic", json!(3600)).await;

        let token = provider(&server).access_token(false).await.unwrap();
        assert_eq!(token, "tok-basic");
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache() {
        let server = MockServer::start().await;
        mount_token(&server, "fresh", json!("3599")).await;

        let provider = provider(&server);
        provider.cache().set("stale", 3600);
        assert_eq!(provider.access_token(false).await.unwrap(), "stale");
        assert_eq!(provider.access_token(true).await.unwrap(), "fresh");
        assert_eq!(provider.cache().get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn invalidate_triggers_refresh() {
        let server = MockServer::start().await;
        mount_token(&server, "after-invalidate", json!(3600)).await;

        let provider = provider(&server);
        provider.cache().set("old", 3600);
        provider.invalidate();
        assert!(provider.cache().get().is_none());
        assert_eq!(
            provider.access_token(false).await.unwrap(),
            "after-invalidate"
        );
    }

    #[tokio::test]
    async fn missing_expires_in_defaults_to_an_hour() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})),
            )
            .mount(&server)
            .await;

        let provider = provider(&server);
        let _ = provider.access_token(false).await.unwrap();
        let remaining = provider.cache().remaining().unwrap();
        assert!(remaining > std::time::Duration::from_secs(3500));
    }

    #[tokio::test]
    async fn rejection_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid credentials"))
            .mount(&server)
            .await;

        let err = provider(&server).access_token(false).await.unwrap_err();
        match err {
            AuthError::OAuth { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid credentials");
            }
            other => panic!("expected OAuth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_access_token_is_error() {
        let server = MockServer::start().await;
        mount_token(&server, "", json!(3600)).await;

        let provider = provider(&server);
        let err = provider.access_token(false).await.unwrap_err();
        assert!(matches!(err, AuthError::EmptyToken));
        assert!(provider.cache().get().is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = provider(&server).access_token(false).await.unwrap_err();
        assert!(matches!(err, AuthError::Json(_)));
    }

    #[tokio::test]
    async fn missing_credentials_skip_network() {
        let provider = TokenProvider::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/never",
            "",
            "",
            Arc::new(CredentialCache::new()),
        );
        let err = provider.access_token(false).await.unwrap_err();
        assert!(matches!(err, AuthError::NotConfigured(_)));
    }
}
