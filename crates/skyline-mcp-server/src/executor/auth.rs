//! Upstream authentication.
//!
//! Static schemes (bearer, basic, api-key) are applied directly. The
//! oauth-refresh scheme exchanges its refresh token for an access token on
//! first use and caches it until shortly before expiry or until the
//! upstream rejects it.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::GatewayError;
use crate::profile::AuthConfig;
use crate::redact::Redactor;

/// Refresh this much before the advertised expiry.
const EXPIRY_SLACK: Duration = Duration::from_secs(30);

pub struct ApiAuth {
    config: AuthConfig,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

impl ApiAuth {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    /// Attach credentials to an upstream request.
    pub async fn apply(
        &self,
        request: reqwest::RequestBuilder,
        client: &reqwest::Client,
        redactor: &Arc<Redactor>,
    ) -> Result<reqwest::RequestBuilder, GatewayError> {
        match &self.config {
            AuthConfig::None => Ok(request),
            AuthConfig::Bearer { token } => Ok(request.bearer_auth(token)),
            AuthConfig::Basic { username, password } => {
                Ok(request.basic_auth(username, Some(password)))
            }
            AuthConfig::ApiKey { header, value } => Ok(request.header(header, value)),
            AuthConfig::OauthRefresh { .. } => {
                let token = self.access_token(client, redactor).await?;
                Ok(request.bearer_auth(token))
            }
        }
    }

    /// Drop the cached access token after an upstream 401 so the next call
    /// refreshes.
    pub async fn invalidate(&self) {
        if matches!(self.config, AuthConfig::OauthRefresh { .. }) {
            *self.cached.lock().await = None;
        }
    }

    async fn access_token(
        &self,
        client: &reqwest::Client,
        redactor: &Arc<Redactor>,
    ) -> Result<String, GatewayError> {
        let AuthConfig::OauthRefresh {
            token_url,
            client_id,
            client_secret,
            refresh_token,
            scopes,
        } = &self.config
        else {
            return Err(GatewayError::Internal(
                "access_token called for non-oauth auth".to_string(),
            ));
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            let fresh = token
                .expires_at
                .map(|at| Instant::now() + EXPIRY_SLACK < at)
                .unwrap_or(true);
            if fresh {
                return Ok(token.access_token.clone());
            }
        }

        debug!(token_url = %token_url, "refreshing oauth access token");
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
            ("client_id", client_id.clone()),
            ("client_secret", client_secret.clone()),
        ];
        if !scopes.is_empty() {
            form.push(("scope", scopes.join(" ")));
        }

        let response = client
            .post(token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                GatewayError::Upstream {
                    status: 502,
                    body: format!("token refresh failed: {e}"),
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body: format!("token refresh rejected: {body}"),
            });
        }
        let token: TokenResponse = response.json().await.map_err(|e| {
            GatewayError::Upstream {
                status: 502,
                body: format!("token refresh returned invalid JSON: {e}"),
            }
        })?;

        // The fresh access token is a secret from this moment on.
        redactor.register(token.access_token.clone());

        let expires_at = token
            .expires_in
            .map(|seconds| Instant::now() + Duration::from_secs(seconds));
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oauth_config(server_uri: &str) -> AuthConfig {
        AuthConfig::OauthRefresh {
            token_url: Url::parse(&format!("{server_uri}/token")).unwrap(),
            client_id: "client".into(),
            client_secret: "secret-value".into(),
            refresh_token: "refresh-value".into(),
            scopes: vec!["read".into()],
        }
    }

    #[tokio::test]
    async fn refreshes_once_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-access-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = ApiAuth::new(oauth_config(&server.uri()));
        let client = reqwest::Client::new();
        let redactor = Arc::new(Redactor::new());

        for _ in 0..3 {
            let token = auth.access_token(&client, &redactor).await.unwrap();
            assert_eq!(token, "fresh-access-token");
        }
        // The access token is now redactable.
        assert!(!redactor.redact("fresh-access-token").contains("fresh-access-token"));
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;

        let auth = ApiAuth::new(oauth_config(&server.uri()));
        let client = reqwest::Client::new();
        let redactor = Arc::new(Redactor::new());

        auth.access_token(&client, &redactor).await.unwrap();
        auth.invalidate().await;
        auth.access_token(&client, &redactor).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad grant"))
            .mount(&server)
            .await;

        let auth = ApiAuth::new(oauth_config(&server.uri()));
        let client = reqwest::Client::new();
        let redactor = Arc::new(Redactor::new());
        assert!(matches!(
            auth.access_token(&client, &redactor).await,
            Err(GatewayError::Upstream { status: 400, .. })
        ));
    }
}
