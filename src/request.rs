use std::fmt;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::errors::Error;

pub const CLIENT_USER_AGENT: &str = concat!("force-rest/", env!("CARGO_PKG_VERSION"));
const JSON: &str = "application/json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Everything needed to (re)send one request. The dispatcher sends the same
/// descriptor again after re-authenticating, so it is never mutated.
#[derive(Clone, Debug)]
pub struct RequestDescriptor<B = ()> {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<B>,
}

impl RequestDescriptor<()> {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }
}

impl<B> RequestDescriptor<B> {
    /// Appends a query parameter. Order is kept on the wire.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_body<T>(self, body: T) -> RequestDescriptor<T> {
        RequestDescriptor {
            method: self.method,
            path: self.path,
            query: self.query,
            body: Some(body),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }
}

/// Joins the instance endpoint, path and percent-encoded query string.
pub fn build_uri(instance_url: &str, path: &str, query: &[(String, String)]) -> String {
    let mut uri = String::with_capacity(instance_url.len() + path.len());
    uri.push_str(instance_url.trim_end_matches('/'));
    if !path.is_empty() && !path.starts_with('/') {
        uri.push('/');
    }
    uri.push_str(path);
    if !query.is_empty() {
        uri.push('?');
        let encoded = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        uri.push_str(&encoded);
    }
    uri
}

pub(crate) fn build_headers(access_token: &str) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    headers.insert(ACCEPT, HeaderValue::from_static(JSON));
    let mut bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| Error::Config("Access token contains invalid header characters".into()))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}
