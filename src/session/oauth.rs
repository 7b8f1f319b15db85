use std::time::SystemTime;

use jiff::Timestamp;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::api_error::ApiErrors;
use crate::config::{AuthFlow, Config};
use crate::errors::Error;
use crate::request::CLIENT_USER_AGENT;
use crate::telemetry::{ReauthOutcome, ReauthTelemetry};

use super::{CredentialHolder, Credentials, jwt};

/// Error code the REST API uses for an expired or revoked access token.
pub const INVALID_SESSION_ID: &str = "INVALID_SESSION_ID";

const TOKEN_PATH: &str = "/services/oauth2/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
    #[serde(default)]
    issued_at: Option<String>,
}

#[derive(Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// OAuth-backed [`CredentialHolder`] shared by every dispatcher in the process.
pub struct OAuthSession {
    http_client: Client,
    login_url: String,
    flow: AuthFlow,
    state: RwLock<Credentials>,
    refresh_lock: Mutex<()>,
}

impl OAuthSession {
    /// Builds a session seeded with any token already present in `config`.
    /// No network call is made.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http_client: Client, config: &Config) -> Result<Self, Error> {
        let flow = config.auth_flow()?;
        let credentials = Credentials {
            access_token: config.access_token.clone().unwrap_or_default(),
            instance_url: config.instance_url.clone().unwrap_or_default(),
            issued_at: None,
            generation: 0,
        };
        Ok(Self {
            http_client,
            login_url: config.login_url.trim_end_matches('/').to_string(),
            flow,
            state: RwLock::new(credentials),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Like [`OAuthSession::from_config`], but authenticates up front when the
    /// config carries no usable token.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let session = Self::from_config(config)?;
        if session.validate().await.is_err() {
            let current = session.credentials().await;
            session.authenticate(&current).await?;
        }
        Ok(session)
    }

    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    fn token_request_body(&self) -> Result<String, Error> {
        match &self.flow {
            AuthFlow::Password {
                client_id,
                client_secret,
                username,
                password,
            } => Ok(form(&[
                ("grant_type", "password"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ])),
            AuthFlow::JwtBearer {
                client_id,
                username,
                private_key_pem,
                passphrase,
                exp_secs,
            } => {
                let claims = jwt::claims(client_id, username, &self.login_url, *exp_secs)?;
                let assertion =
                    jwt::sign_assertion(&claims, private_key_pem, passphrase.as_deref())?;
                Ok(form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ]))
            }
            AuthFlow::Static => Err(Error::Auth(
                "no re-authentication flow configured; supply a password or private key".into(),
            )),
        }
    }

    async fn request_token(&self) -> Result<TokenResponse, Error> {
        let body = self.token_request_body()?;
        let url = format!("{}{TOKEN_PATH}", self.login_url);
        let resp = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if status.is_success() {
            return serde_json::from_slice::<TokenResponse>(&bytes)
                .map_err(|e| Error::Auth(format!("unexpected token response: {e}")));
        }
        match serde_json::from_slice::<OAuthErrorResponse>(&bytes) {
            Ok(err) => Err(Error::Auth(format!(
                "{} ({}): {}",
                err.error, status, err.error_description
            ))),
            Err(_) => Err(Error::Auth(format!("token endpoint returned {status}"))),
        }
    }
}

impl CredentialHolder for OAuthSession {
    async fn validate(&self) -> Result<(), Error> {
        let state = self.state.read().await;
        if state.access_token.is_empty() {
            return Err(Error::Config("No access token; authenticate first".into()));
        }
        if state.instance_url.is_empty() {
            return Err(Error::Config("No instance URL; authenticate first".into()));
        }
        Ok(())
    }

    async fn credentials(&self) -> Credentials {
        self.state.read().await.clone()
    }

    async fn authenticate(&self, stale: &Credentials) -> Result<(), Error> {
        let telemetry = ReauthTelemetry::new(self.flow.name());

        // Only one refresh runs at a time. A caller whose rejected request
        // predates a finished refresh reuses that refresh's token.
        let _lock = self.refresh_lock.lock().await;
        let current = self.state.read().await.generation;
        if current != stale.generation {
            telemetry.emit_skipped(stale.generation, current);
            return Ok(());
        }

        telemetry.emit_start(SystemTime::now());
        match self.request_token().await {
            Ok(token) => {
                let issued_at = token.issued_at.as_deref().and_then(parse_issued_at);
                let token_len = token.access_token.len();
                {
                    let mut state = self.state.write().await;
                    *state = Credentials {
                        access_token: token.access_token,
                        instance_url: token.instance_url,
                        issued_at,
                        generation: current + 1,
                    };
                    debug!(generation = state.generation, "session credentials replaced");
                }
                telemetry.emit_success(ReauthOutcome::Refreshed, token_len, SystemTime::now());
                Ok(())
            }
            Err(err) => {
                telemetry.emit_failure(&err, SystemTime::now());
                Err(err)
            }
        }
    }

    fn expired(&self, errors: &ApiErrors) -> bool {
        errors.contains_code(INVALID_SESSION_ID)
    }
}

fn form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `issued_at` arrives as epoch milliseconds in a string.
fn parse_issued_at(raw: &str) -> Option<Timestamp> {
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Timestamp::from_millisecond(ms).ok())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api_error::ApiError;

    fn password_config(login_url: String) -> Config {
        Config {
            login_url,
            client_id: Some("cid".into()),
            client_secret: Some("secret".into()),
            username: Some("user@example.com".into()),
            password: Some("pw".into()),
            security_token: Some("TOK".into()),
            ..Config::default()
        }
    }

    fn token_body(token: &str, instance_url: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "instance_url": instance_url,
            "id": "https://login.example.com/id/00D/005",
            "token_type": "Bearer",
            "issued_at": "1700000000000",
            "signature": "sig"
        })
    }

    #[tokio::test]
    async fn validate_fails_without_token() {
        let session = OAuthSession::from_config(&Config::default()).unwrap();
        match session.validate().await {
            Err(Error::Config(msg)) => assert!(msg.contains("No access token")),
            other => panic!("expected config error, got {:?}", other),
        }

        let session = OAuthSession::from_config(&Config {
            access_token: Some("t".into()),
            ..Config::default()
        })
        .unwrap();
        assert!(matches!(session.validate().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn password_grant_replaces_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=user%40example.com"))
            .and(body_string_contains("password=pwTOK"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_body("fresh", "https://na1.example.com")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = OAuthSession::from_config(&password_config(server.uri())).unwrap();
        assert_eq!(session.flow().name(), "password");
        let stale = session.credentials().await;
        session.authenticate(&stale).await.expect("authenticate");

        let creds = session.credentials().await;
        assert_eq!(creds.access_token, "fresh");
        assert_eq!(creds.instance_url, "https://na1.example.com");
        assert_eq!(
            creds.issued_at,
            Some(Timestamp::from_millisecond(1_700_000_000_000).unwrap())
        );
        assert_eq!(session.generation().await, 1);
        session.validate().await.expect("valid after authenticate");
    }

    #[tokio::test]
    async fn oauth_error_body_becomes_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "authentication failure"
            })))
            .mount(&server)
            .await;

        let session = OAuthSession::from_config(&password_config(server.uri())).unwrap();
        match session.authenticate(&session.credentials().await).await {
            Err(Error::Auth(msg)) => {
                assert!(msg.contains("invalid_grant"));
                assert!(msg.contains("authentication failure"));
            }
            other => panic!("expected auth error, got {:?}", other),
        }
        assert_eq!(session.generation().await, 0);
    }

    #[tokio::test]
    async fn static_flow_cannot_reauthenticate() {
        let session = OAuthSession::from_config(&Config {
            access_token: Some("t".into()),
            instance_url: Some("https://na1.example.com".into()),
            ..Config::default()
        })
        .unwrap();
        let stale = session.credentials().await;
        assert!(matches!(session.authenticate(&stale).await, Err(Error::Auth(_))));
        assert_eq!(session.credentials().await.access_token, "t");
    }

    #[tokio::test]
    async fn concurrent_expirations_refresh_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("fresh", "https://na1.example.com"))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = Arc::new(OAuthSession::from_config(&password_config(server.uri())).unwrap());
        let stale = session.credentials().await;
        let (a, b) = tokio::join!(session.authenticate(&stale), session.authenticate(&stale));
        a.expect("first");
        b.expect("second");
        assert_eq!(session.generation().await, 1);
    }

    #[tokio::test]
    async fn late_rejection_reuses_finished_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_body("fresh", "https://na1.example.com")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut config = password_config(server.uri());
        config.access_token = Some("stale".into());
        config.instance_url = Some("https://na1.example.com".into());
        let session = OAuthSession::from_config(&config).unwrap();

        // both requests went out with the same token; the second rejection
        // only arrives once the first refresh has completed
        let first = session.credentials().await;
        let second = first.clone();
        session.authenticate(&first).await.expect("first refresh");
        session.authenticate(&second).await.expect("second refresh skipped");

        let creds = session.credentials().await;
        assert_eq!(creds.access_token, "fresh");
        assert_eq!(creds.generation, 1);
        assert!(!format!("{creds:?}").contains("fresh"));
    }

    #[tokio::test]
    async fn connect_skips_authentication_when_token_is_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = password_config(server.uri());
        config.access_token = Some("preissued".into());
        config.instance_url = Some("https://na1.example.com".into());
        let session = OAuthSession::connect(&config).await.expect("connect");
        assert_eq!(session.credentials().await.access_token, "preissued");
    }

    #[test]
    fn only_invalid_session_counts_as_expired() {
        let session = OAuthSession::from_config(&Config::default()).unwrap();
        let expired = ApiErrors(vec![ApiError {
            error_code: INVALID_SESSION_ID.into(),
            message: "Session expired or invalid".into(),
            fields: vec![],
        }]);
        let domain = ApiErrors(vec![ApiError {
            error_code: "REQUIRED_FIELD_MISSING".into(),
            message: "Name required".into(),
            fields: vec!["Name".into()],
        }]);
        assert!(session.expired(&expired));
        assert!(!session.expired(&domain));
    }

    #[test]
    fn form_encodes_values() {
        assert_eq!(
            form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", "a.b.c")]),
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer&assertion=a.b.c"
        );
    }
}
