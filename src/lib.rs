//! Request dispatcher for the force.com REST API: authenticated JSON
//! requests with a single transparent re-authentication when the session
//! expires.

pub mod api_error;
pub mod codec;
pub mod config;
mod dispatch;
pub mod errors;
pub mod request;
pub mod session;
pub mod telemetry;

pub use api_error::{ApiError, ApiErrors};
pub use codec::{Classified, Codec, JsonCodec, classify, classify_discard};
pub use config::{AuthFlow, Config, ConfigLocation};
pub use dispatch::Dispatcher;
pub use errors::Error;
pub use request::{Method, RequestDescriptor};
pub use session::{CredentialHolder, Credentials, OAuthSession};

#[cfg(test)]
mod tests;
