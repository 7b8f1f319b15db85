#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wiremock::MockServer;

use force_rest::{Config, Dispatcher, OAuthSession};

pub const ACCOUNT_ID: &str = "001i000000RxW18";
pub const EXPIRED_BODY: &str = r#"[{"errorCode":"INVALID_SESSION_ID","message":"Session expired"}]"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

pub fn account_path(id: &str) -> String {
    format!("/services/data/v59.0/sobjects/Account/{id}")
}

/// Session with a pre-issued token pointed at the mock server and no way to refresh.
pub fn static_config(server: &MockServer) -> Config {
    Config {
        instance_url: Some(server.uri()),
        access_token: Some("static-token".into()),
        ..Config::default()
    }
}

/// Password-grant session whose login endpoint and instance are both the mock server.
pub fn password_config(server: &MockServer, token: &str) -> Config {
    Config {
        login_url: server.uri(),
        instance_url: Some(server.uri()),
        access_token: Some(token.to_string()),
        client_id: Some("client-id".into()),
        client_secret: Some("client-secret".into()),
        username: Some("user@example.com".into()),
        password: Some("password".into()),
        ..Config::default()
    }
}

pub fn dispatcher(config: &Config) -> (Dispatcher<OAuthSession>, Arc<OAuthSession>) {
    let session = Arc::new(OAuthSession::from_config(config).expect("session"));
    (Dispatcher::new(session.clone()), session)
}

pub fn token_response(token: &str, instance_url: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": token,
        "instance_url": instance_url,
        "token_type": "Bearer",
        "issued_at": "1700000000000"
    })
}
