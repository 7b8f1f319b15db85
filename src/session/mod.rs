use std::fmt;
use std::future::Future;

use jiff::Timestamp;

use crate::api_error::ApiErrors;
use crate::errors::Error;

mod jwt;
mod oauth;

pub use oauth::{INVALID_SESSION_ID, OAuthSession};

/// Access token and the instance endpoint it is valid for.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub instance_url: String,
    pub issued_at: Option<Timestamp>,
    /// Number of refreshes that preceded this snapshot.
    pub generation: u64,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("instance_url", &self.instance_url)
            .field("issued_at", &self.issued_at)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Source of credentials for the dispatcher.
///
/// Implementations are shared between concurrent callers: `credentials` must
/// return a consistent snapshot and `authenticate` must serialize refreshes.
pub trait CredentialHolder: Send + Sync {
    /// Fails with [`Error::Config`] when no usable token or endpoint is set.
    fn validate(&self) -> impl Future<Output = Result<(), Error>> + Send;

    fn credentials(&self) -> impl Future<Output = Credentials> + Send;

    /// Obtains a fresh token to replace `stale`, the snapshot a rejected
    /// request carried. Returns without a token request when the held
    /// credentials have already moved past `stale`.
    fn authenticate(
        &self,
        stale: &Credentials,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Whether `errors` reports an invalid or expired session.
    fn expired(&self, errors: &ApiErrors) -> bool;
}
