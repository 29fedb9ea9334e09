use crate::errors::{AuthError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Credential presented to the track API
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Exchanges operator credentials for a bearer token
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn exchange(&self, username: &str, password: &str)
        -> std::result::Result<BearerToken, AuthError>;
}

/// Current authentication state of the operator.
///
/// `authenticated` is derived from token presence, so the two cannot drift.
#[derive(Debug, Default)]
pub struct AuthSession {
    token: Option<BearerToken>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn authenticate(
        &mut self,
        provider: &dyn AuthProvider,
        username: &str,
        password: &str,
    ) -> std::result::Result<BearerToken, AuthError> {
        match provider.exchange(username, password).await {
            Ok(token) => {
                info!("Authenticated as {}", username);
                self.token = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!("Authentication failed for {}: {}", username, e);
                self.token = None;
                Err(e)
            }
        }
    }

    pub fn current_token(&self) -> Option<&BearerToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn invalidate(&mut self) {
        if self.token.take().is_some() {
            info!("Session invalidated, re-authentication required");
        }
    }
}

/// Shared-secret deployment: the password is the API token itself
#[derive(Debug, Default, Clone)]
pub struct PassphraseProvider;

#[async_trait]
impl AuthProvider for PassphraseProvider {
    async fn exchange(
        &self,
        _username: &str,
        password: &str,
    ) -> std::result::Result<BearerToken, AuthError> {
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(BearerToken::new(password))
    }
}

const COGNITO_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const COGNITO_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: AuthParameters<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct AuthParameters<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct CognitoErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// User-pool deployment: `USER_PASSWORD_AUTH` against the identity provider,
/// the returned id token authorizes track requests.
#[derive(Debug, Clone)]
pub struct CognitoProvider {
    endpoint: String,
    client_id: String,
    http: reqwest::Client,
}

impl CognitoProvider {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            http,
        })
    }

    pub fn for_region(region: &str, client_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::new(
            format!("https://cognito-idp.{}.amazonaws.com/", region),
            client_id,
            timeout,
        )
    }
}

#[async_trait]
impl AuthProvider for CognitoProvider {
    async fn exchange(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<BearerToken, AuthError> {
        let request = InitiateAuthRequest {
            auth_flow: "USER_PASSWORD_AUTH",
            client_id: &self.client_id,
            auth_parameters: AuthParameters { username, password },
        };
        let body = serde_json::to_vec(&request).map_err(|e| AuthError::Provider(e.to_string()))?;

        debug!("Requesting id token from {}", self.endpoint);
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Amz-Target", COGNITO_TARGET)
            .header(reqwest::header::CONTENT_TYPE, COGNITO_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let error: CognitoErrorBody = serde_json::from_slice(&bytes).unwrap_or(CognitoErrorBody {
                kind: String::new(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
            return Err(classify_cognito_error(status.as_u16(), &error));
        }

        let parsed: InitiateAuthResponse = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Provider(format!("unexpected response: {}", e)))?;

        match (parsed.authentication_result, parsed.challenge_name) {
            (Some(result), _) => Ok(BearerToken::new(result.id_token)),
            (None, Some(challenge)) => Err(AuthError::Provider(format!(
                "challenge {} is not supported",
                challenge
            ))),
            (None, None) => Err(AuthError::Provider(
                "response carried no authentication result".to_string(),
            )),
        }
    }
}

fn classify_cognito_error(status: u16, error: &CognitoErrorBody) -> AuthError {
    // __type may be prefixed with a namespace, e.g. "com.amazon...#NotAuthorizedException"
    let kind = error.kind.rsplit('#').next().unwrap_or_default();
    match kind {
        "NotAuthorizedException" | "UserNotFoundException" | "PasswordResetRequiredException" => {
            AuthError::InvalidCredentials
        }
        _ if error.message.is_empty() => AuthError::Provider(format!("HTTP {}", status)),
        _ => AuthError::Provider(format!("HTTP {}: {}", status, error.message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rejecting;

    #[async_trait]
    impl AuthProvider for Rejecting {
        async fn exchange(
            &self,
            _username: &str,
            _password: &str,
        ) -> std::result::Result<BearerToken, AuthError> {
            Err(AuthError::Unreachable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_passphrase_login() {
        tokio_test::block_on(async {
            let mut session = AuthSession::new();
            assert!(!session.is_authenticated());

            let token = session
                .authenticate(&PassphraseProvider, "operator", "pass12345!")
                .await
                .unwrap();

            assert_eq!(token.as_str(), "pass12345!");
            assert!(session.is_authenticated());
            assert_eq!(session.current_token(), Some(&token));
        });
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        tokio_test::block_on(async {
            let mut session = AuthSession::new();
            let result = session.authenticate(&PassphraseProvider, "operator", "").await;

            assert_eq!(result, Err(AuthError::InvalidCredentials));
            assert!(!session.is_authenticated());
        });
    }

    #[test]
    fn test_failed_login_clears_previous_token() {
        tokio_test::block_on(async {
            let mut session = AuthSession::new();
            session
                .authenticate(&PassphraseProvider, "operator", "secret")
                .await
                .unwrap();

            let result = session.authenticate(&Rejecting, "operator", "secret").await;
            assert!(matches!(result, Err(AuthError::Unreachable(_))));
            assert!(session.current_token().is_none());
        });
    }

    #[test]
    fn test_invalidate() {
        tokio_test::block_on(async {
            let mut session = AuthSession::new();
            session
                .authenticate(&PassphraseProvider, "operator", "secret")
                .await
                .unwrap();

            session.invalidate();
            assert!(!session.is_authenticated());
            assert!(session.current_token().is_none());

            // Idempotent
            session.invalidate();
            assert!(!session.is_authenticated());
        });
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = BearerToken::new("eyJraWQiOi");
        assert_eq!(format!("{:?}", token), "BearerToken(***)");
    }

    #[test]
    fn test_classify_cognito_errors() {
        let error = CognitoErrorBody {
            kind: "NotAuthorizedException".to_string(),
            message: "Incorrect username or password.".to_string(),
        };
        assert_eq!(classify_cognito_error(400, &error), AuthError::InvalidCredentials);

        let namespaced = CognitoErrorBody {
            kind: "com.amazonaws#UserNotFoundException".to_string(),
            message: String::new(),
        };
        assert_eq!(classify_cognito_error(400, &namespaced), AuthError::InvalidCredentials);

        let throttled = CognitoErrorBody {
            kind: "TooManyRequestsException".to_string(),
            message: "Rate exceeded".to_string(),
        };
        assert_eq!(
            classify_cognito_error(400, &throttled),
            AuthError::Provider("HTTP 400: Rate exceeded".to_string())
        );
    }
}
