//! read configuration from a file, the environment, or AWS Secrets Manager

use std::fmt;
use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use serde::Deserialize;

use crate::errors::Error;

pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";
const DEFAULT_JWT_EXP_SECS: u64 = 300;

pub enum ConfigLocation {
    File(PathBuf),
    Env,
    Secret,
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default)]
    pub instance_url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub security_token: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub jwt_exp_secs: Option<u64>,
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            instance_url: None,
            access_token: None,
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            security_token: None,
            private_key: None,
            private_key_path: None,
            private_key_passphrase: None,
            jwt_exp_secs: None,
        }
    }
}

/// How a session obtains a fresh access token.
#[derive(Clone)]
pub enum AuthFlow {
    /// OAuth username-password grant.
    Password {
        client_id: String,
        client_secret: String,
        username: String,
        /// Password with the security token appended.
        password: String,
    },
    /// OAuth JWT bearer grant signed with an RSA key.
    JwtBearer {
        client_id: String,
        username: String,
        private_key_pem: String,
        passphrase: Option<String>,
        exp_secs: u64,
    },
    /// Pre-issued token only; expiry cannot be recovered from.
    Static,
}

const REDACTED: &str = "<redacted>";

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| REDACTED)
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("login_url", &self.login_url)
            .field("instance_url", &self.instance_url)
            .field("access_token", &redact(&self.access_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("security_token", &redact(&self.security_token))
            .field("private_key", &redact(&self.private_key))
            .field("private_key_path", &self.private_key_path)
            .field("private_key_passphrase", &redact(&self.private_key_passphrase))
            .field("jwt_exp_secs", &self.jwt_exp_secs)
            .finish()
    }
}

impl fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFlow::Password {
                client_id,
                username,
                ..
            } => f
                .debug_struct("Password")
                .field("client_id", client_id)
                .field("client_secret", &REDACTED)
                .field("username", username)
                .field("password", &REDACTED)
                .finish(),
            AuthFlow::JwtBearer {
                client_id,
                username,
                passphrase,
                exp_secs,
                ..
            } => f
                .debug_struct("JwtBearer")
                .field("client_id", client_id)
                .field("username", username)
                .field("private_key_pem", &REDACTED)
                .field("passphrase", &redact(passphrase))
                .field("exp_secs", exp_secs)
                .finish(),
            AuthFlow::Static => f.write_str("Static"),
        }
    }
}

impl AuthFlow {
    pub fn name(&self) -> &'static str {
        match self {
            AuthFlow::Password { .. } => "password",
            AuthFlow::JwtBearer { .. } => "jwt_bearer",
            AuthFlow::Static => "static",
        }
    }
}

impl Config {
    pub async fn load(loc: ConfigLocation) -> Result<Self, Error> {
        let config = match loc {
            ConfigLocation::File(path) => Self::from_file(path)?,
            ConfigLocation::Env => Self::from_env()?,
            ConfigLocation::Secret => Self::from_secret().await?,
        };
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, Error> {
        let config = Config {
            login_url: env_opt("FORCE_LOGIN_URL").unwrap_or_else(default_login_url),
            instance_url: env_opt("FORCE_INSTANCE_URL"),
            access_token: env_opt("FORCE_ACCESS_TOKEN"),
            client_id: env_opt("FORCE_CLIENT_ID"),
            client_secret: env_opt("FORCE_CLIENT_SECRET"),
            username: env_opt("FORCE_USERNAME"),
            password: env_opt("FORCE_PASSWORD"),
            security_token: env_opt("FORCE_SECURITY_TOKEN"),
            private_key: None,
            private_key_path: env_opt("FORCE_PRIVATE_KEY_PATH"),
            private_key_passphrase: env_opt("FORCE_PRIVATE_KEY_PASSPHRASE"),
            jwt_exp_secs: match env_opt("FORCE_JWT_EXP_SECS") {
                Some(raw) => Some(raw.parse().map_err(|_| {
                    Error::Config(format!("FORCE_JWT_EXP_SECS must be an integer (got '{raw}')"))
                })?),
                None => None,
            },
        };
        config.validate()?;
        Ok(config)
    }

    async fn from_secret() -> Result<Self, Error> {
        let secret_arn = std::env::var("FORCE_CONFIG_SECRET_ARN")
            .map_err(|_| Error::Config("Missing FORCE_CONFIG_SECRET_ARN env var".to_string()))?;
        let client = aws_sdk_secretsmanager::Client::new(
            &aws_config::load_defaults(BehaviorVersion::latest()).await,
        );
        let resp = client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| Error::Config(format!("Failed to get secret: {}", e)))?;
        let secret = resp.secret_string().ok_or_else(|| {
            Error::Config("Failed to get secret string, returned None".to_string())
        })?;
        let config: Config = serde_json::from_str(secret)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        reqwest::Url::parse(&self.login_url).map_err(|e| {
            Error::Config(format!("Invalid login URL '{}': {}", self.login_url, e))
        })?;
        if let Some(instance_url) = self.instance_url.as_deref().filter(|u| !u.is_empty()) {
            reqwest::Url::parse(instance_url).map_err(|e| {
                Error::Config(format!("Invalid instance URL '{}': {}", instance_url, e))
            })?;
        }
        Ok(())
    }

    /// Inline key wins over `private_key_path`.
    pub fn private_key(&self) -> Result<Option<String>, Error> {
        match (&self.private_key, &self.private_key_path) {
            (Some(pem), _) if !pem.is_empty() => Ok(Some(pem.clone())),
            (_, Some(path)) if !path.is_empty() => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|e| Error::Key(format!("Unable to read private key '{}': {}", path, e))),
            _ => Ok(None),
        }
    }

    /// Picks the re-authentication flow from the populated fields. A private
    /// key selects the JWT bearer flow, a password the password flow.
    pub fn auth_flow(&self) -> Result<AuthFlow, Error> {
        if let Some(private_key_pem) = self.private_key()? {
            let exp_secs = self.jwt_exp_secs.unwrap_or(DEFAULT_JWT_EXP_SECS);
            if exp_secs == 0 || exp_secs > 3600 {
                return Err(Error::Config(format!(
                    "jwt_exp_secs must be between 1 and 3600 seconds (got {})",
                    exp_secs
                )));
            }
            return Ok(AuthFlow::JwtBearer {
                client_id: required(&self.client_id, "client_id")?,
                username: required(&self.username, "username")?,
                private_key_pem,
                passphrase: self.private_key_passphrase.clone(),
                exp_secs,
            });
        }

        if let Some(password) = self.password.as_ref().filter(|p| !p.is_empty()) {
            let security_token = self.security_token.as_deref().unwrap_or_default();
            return Ok(AuthFlow::Password {
                client_id: required(&self.client_id, "client_id")?,
                client_secret: required(&self.client_secret, "client_secret")?,
                username: required(&self.username, "username")?,
                password: format!("{password}{security_token}"),
            });
        }

        Ok(AuthFlow::Static)
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn required(value: &Option<String>, field: &str) -> Result<String, Error> {
    value
        .as_ref()
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| Error::Config(format!("Missing {field} for the configured auth flow")))
}
