//! Error envelope returned by the REST API when a request is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One entry of the remote error envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiError {
    pub error_code: String,
    pub message: String,
    pub fields: Vec<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)?;
        if !self.fields.is_empty() {
            write!(f, " (fields: {})", self.fields.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered list of [`ApiError`]s as sent on the wire, e.g.
/// `[{"errorCode":"REQUIRED_FIELD_MISSING","message":"Name required","fields":["Name"]}]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiErrors(pub Vec<ApiError>);

impl ApiErrors {
    /// A decoded envelope only counts as an API error when it is non-empty and
    /// every entry carries an error code.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|e| !e.error_code.is_empty())
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.0.iter().any(|e| e.error_code == code)
    }

    pub fn codes(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.error_code.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ApiError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ApiError>> for ApiErrors {
    fn from(errors: Vec<ApiError>) -> Self {
        ApiErrors(errors)
    }
}

impl<'a> IntoIterator for &'a ApiErrors {
    type Item = &'a ApiError;
    type IntoIter = std::slice::Iter<'a, ApiError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ApiErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiErrors {}
