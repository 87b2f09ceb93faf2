//! # Backend Session Client
//!
//! Thin client for the two backend endpoints the session core relies on:
//!
//! | Call                 | Request                                     | Success            |
//! |----------------------|---------------------------------------------|--------------------|
//! | [`BackendClient::login`]  | `POST auth/login`, `Authorization: Bearer`, body `{}` | `200` + user JSON |
//! | [`BackendClient::signup`] | `POST auth/signup`, body `{uid, email, username}`     | `200` + user JSON |
//!
//! Only status `200` counts as success. Every other status is a
//! [`AuthError::BackendRejected`]; transport failures and timeouts are
//! [`AuthError::BackendUnavailable`]; a `200` whose body is not a user
//! record is [`AuthError::InvalidResponse`].

use crate::error::{AuthError, Result};
use crate::types::{ApplicationUser, SignupRequest};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::BackendConfig;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

pub const LOGIN_ENDPOINT: &str = "auth/login";
pub const SIGNUP_ENDPOINT: &str = "auth/signup";

const SUCCESS_STATUS: u16 = 200;

/// Client for the application backend's session endpoints.
#[derive(Clone)]
pub struct BackendClient {
    http_client: Arc<dyn HttpClient>,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: BackendConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Exchanges a provider identity token for the backend's user record.
    #[instrument(skip(self, id_token))]
    pub async fn login(&self, id_token: &str) -> Result<ApplicationUser> {
        let request = self
            .request(LOGIN_ENDPOINT)?
            .bearer_token(id_token)
            .json(&serde_json::json!({}))?;

        let response = self.send(LOGIN_ENDPOINT, request, None).await?;
        Self::parse_user(LOGIN_ENDPOINT, response)
    }

    /// Registers a freshly created provider account with the backend.
    ///
    /// Sent exactly once: a replayed signup could register the account twice.
    #[instrument(skip(self, request), fields(uid = %request.uid))]
    pub async fn signup(&self, request: &SignupRequest) -> Result<ApplicationUser> {
        let http_request = self.request(SIGNUP_ENDPOINT)?.json(request)?;

        let response = self
            .send(SIGNUP_ENDPOINT, http_request, Some(RetryPolicy::no_retry()))
            .await?;
        Self::parse_user(SIGNUP_ENDPOINT, response)
    }

    fn request(&self, endpoint: &str) -> Result<HttpRequest> {
        let url = self.config.endpoint(endpoint)?;
        Ok(HttpRequest::new(HttpMethod::Post, url.as_str()).timeout(self.config.request_timeout))
    }

    async fn send(
        &self,
        endpoint: &str,
        request: HttpRequest,
        policy: Option<RetryPolicy>,
    ) -> Result<HttpResponse> {
        let call = async {
            match policy {
                Some(policy) => self.http_client.execute_with_retry(request, policy).await,
                None => self.http_client.execute(request).await,
            }
        };

        match timeout(self.config.request_timeout, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                warn!(endpoint, error = %e, "Backend request failed");
                Err(AuthError::BackendUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(
                    endpoint,
                    timeout_ms = self.config.request_timeout.as_millis() as u64,
                    "Backend request timed out"
                );
                Err(AuthError::BackendUnavailable(format!(
                    "{} timed out after {:?}",
                    endpoint, self.config.request_timeout
                )))
            }
        }
    }

    fn parse_user(endpoint: &str, response: HttpResponse) -> Result<ApplicationUser> {
        if response.status != SUCCESS_STATUS {
            warn!(endpoint, status = response.status, "Backend rejected request");
            return Err(AuthError::BackendRejected {
                endpoint: endpoint.to_string(),
                status: response.status,
            });
        }

        let user: ApplicationUser = response
            .json()
            .map_err(|e| AuthError::InvalidResponse(format!("{}: {}", endpoint, e)))?;

        debug!(endpoint, uid = %user.uid, "Backend confirmed user");
        Ok(user)
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.config.base_url().as_str())
            .field("request_timeout", &self.config.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;
    use std::time::Duration;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn client(mock_http: MockHttpClient) -> BackendClient {
        let config = BackendConfig::new("https://api.example.com/v1").unwrap();
        BackendClient::new(Arc::new(mock_http), config)
    }

    #[tokio::test]
    async fn test_login_sends_bearer_token() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(req.url, "https://api.example.com/v1/auth/login");
            assert_eq!(
                req.headers.get("Authorization").map(String::as_str),
                Some("Bearer token-1")
            );
            assert_eq!(req.body.as_deref(), Some(&b"{}"[..]));
            Ok(response(200, r#"{"uid":"u1","username":"alice"}"#))
        });

        let user = client(mock_http).login("token-1").await.unwrap();
        assert_eq!(user.uid, "u1");
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_signup_sends_payload_without_token() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://api.example.com/v1/auth/signup");
            assert!(!req.headers.contains_key("Authorization"));
            let body: serde_json::Value =
                serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(
                body,
                serde_json::json!({"uid": "u1", "email": "a@b.com", "username": "alice"})
            );
            Ok(response(
                200,
                r#"{"uid":"u1","email":"a@b.com","username":"alice"}"#,
            ))
        });

        let request = SignupRequest {
            uid: "u1".to_string(),
            email: "a@b.com".to_string(),
            username: "alice".to_string(),
        };
        let user = client(mock_http).signup(&request).await.unwrap();
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_only_200_is_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(201, r#"{"uid":"u1"}"#)));

        let err = client(mock_http).login("t").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::BackendRejected { status: 201, ref endpoint } if endpoint == LOGIN_ENDPOINT
        ));
    }

    #[tokio::test]
    async fn test_rejection_status() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, "unauthorized")));

        let err = client(mock_http).login("t").await.unwrap_err();
        assert!(matches!(err, AuthError::BackendRejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("connection refused".into())));

        let err = client(mock_http).login("t").await.unwrap_err();
        assert!(matches!(err, AuthError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, "<html>oops</html>")));

        let err = client(mock_http).login("t").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }

    struct SlowHttpClient;

    #[async_trait]
    impl HttpClient for SlowHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(response(200, r#"{"uid":"u1"}"#))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_backend_unavailable() {
        let config = BackendConfig::new("https://api.example.com")
            .unwrap()
            .with_request_timeout(Duration::from_secs(1));
        let backend = BackendClient::new(Arc::new(SlowHttpClient), config);

        let err = backend.login("t").await.unwrap_err();
        match err {
            AuthError::BackendUnavailable(message) => assert!(message.contains("timed out")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
