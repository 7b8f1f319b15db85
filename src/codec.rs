//! JSON encoding of request bodies and classification of response bodies.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api_error::ApiErrors;

/// Payload encoding used by the dispatcher.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, serde_json::Error>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, serde_json::Error>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(value)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Result of interpreting one buffered response body.
#[derive(Debug)]
pub enum Classified<T> {
    /// Body decoded into the requested output. For calls without an output
    /// target this is `()` whenever the body is not an error envelope.
    Decoded(T),
    /// Body is a valid API error envelope.
    ErrorEnvelope(ApiErrors),
    /// The body matched neither shape. Carries the object decode error, not
    /// the envelope one.
    Malformed(serde_json::Error),
}

/// Classifies a response body for a call that wants an object back. The
/// object decode is tried first and wins outright; the error envelope is only
/// considered after it fails, and only a valid envelope is reported as one.
pub fn classify<T, C>(codec: &C, body: &[u8]) -> Classified<T>
where
    T: DeserializeOwned,
    C: Codec + ?Sized,
{
    match codec.decode::<T>(body) {
        Ok(value) => Classified::Decoded(value),
        Err(err) => match envelope(codec, body) {
            Some(errors) => Classified::ErrorEnvelope(errors),
            None => Classified::Malformed(err),
        },
    }
}

/// Classifies a response body for a call that discards it. Anything other
/// than a valid error envelope, including an empty or unparseable body, is
/// success.
pub fn classify_discard<C>(codec: &C, body: &[u8]) -> Classified<()>
where
    C: Codec + ?Sized,
{
    match envelope(codec, body) {
        Some(errors) => Classified::ErrorEnvelope(errors),
        None => Classified::Decoded(()),
    }
}

fn envelope<C: Codec + ?Sized>(codec: &C, body: &[u8]) -> Option<ApiErrors> {
    codec
        .decode::<ApiErrors>(body)
        .ok()
        .filter(ApiErrors::is_valid)
}
