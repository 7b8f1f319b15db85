use std::fmt;

use crate::api_error::ApiErrors;

#[derive(Debug)]
pub enum Error {
    /// Credentials or configuration missing/invalid. Raised before any network call.
    Config(String),
    Io(std::io::Error),
    /// Config file or secret payload was not valid JSON.
    Json(serde_json::Error),
    /// Connection, DNS, timeout, or body read failure.
    Transport(reqwest::Error),
    /// Request payload could not be encoded.
    Encode(serde_json::Error),
    /// Response body did not match the requested shape.
    Decode(serde_json::Error),
    /// The remote service rejected the request.
    Api(ApiErrors),
    /// Authentication against the token endpoint failed.
    Auth(String),
    Key(String),
    JwtSign(String),
}

impl Error {
    /// Remote error envelope, when the service rejected the request.
    pub fn api_errors(&self) -> Option<&ApiErrors> {
        match self {
            Error::Api(errors) => Some(errors),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Json(err) => write!(f, "invalid json: {err}"),
            Error::Transport(err) => write!(f, "transport error: {err}"),
            Error::Encode(err) => write!(f, "unable to encode request payload: {err}"),
            Error::Decode(err) => write!(f, "unable to decode response to object: {err}"),
            Error::Api(errors) => write!(f, "api error: {errors}"),
            Error::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Error::Key(msg) => write!(f, "private key error: {msg}"),
            Error::JwtSign(msg) => write!(f, "jwt signing error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) | Error::Encode(err) | Error::Decode(err) => Some(err),
            Error::Transport(err) => Some(err),
            Error::Api(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<ApiErrors> for Error {
    fn from(errors: ApiErrors) -> Self {
        Error::Api(errors)
    }
}
