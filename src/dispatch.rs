use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::codec::{Classified, Codec, JsonCodec, classify, classify_discard};
use crate::errors::Error;
use crate::request::{Method, RequestDescriptor, build_headers, build_uri};
use crate::session::{CredentialHolder, Credentials};
use crate::telemetry::DispatchOutcome;

/// Sends authenticated requests and re-authenticates once when the remote
/// service reports an expired session.
pub struct Dispatcher<H, C = JsonCodec> {
    http_client: Client,
    holder: Arc<H>,
    codec: C,
}

impl<H, C: Clone> Clone for Dispatcher<H, C> {
    fn clone(&self) -> Self {
        Self {
            http_client: self.http_client.clone(),
            holder: Arc::clone(&self.holder),
            codec: self.codec.clone(),
        }
    }
}

impl<H: CredentialHolder> Dispatcher<H, JsonCodec> {
    pub fn new(holder: Arc<H>) -> Self {
        Self::build(Client::new(), holder, JsonCodec)
    }
}

impl<H: CredentialHolder, C: Codec> Dispatcher<H, C> {
    pub fn build(http_client: Client, holder: Arc<H>, codec: C) -> Self {
        Self {
            http_client,
            holder,
            codec,
        }
    }

    pub fn holder(&self) -> Arc<H> {
        Arc::clone(&self.holder)
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Sends `request` and decodes the response into `T`.
    pub async fn dispatch<B, T>(&self, request: &RequestDescriptor<B>) -> Result<T, Error>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        self.execute(request, classify::<T, C>).await
    }

    /// Sends `request` without decoding a response object. A body that is not
    /// an error envelope, including an empty or unparseable one, counts as
    /// success.
    pub async fn dispatch_discard<B>(&self, request: &RequestDescriptor<B>) -> Result<(), Error>
    where
        B: Serialize + Sync,
    {
        self.execute(request, classify_discard::<C>).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, Error> {
        let request = RequestDescriptor::new(Method::Get, path).with_query(query.iter().copied());
        self.dispatch(&request).await
    }

    pub async fn post<B, T>(&self, path: &str, query: &[(&str, &str)], body: &B) -> Result<T, Error>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::new(Method::Post, path)
            .with_query(query.iter().copied())
            .with_body(body);
        self.dispatch(&request).await
    }

    /// PATCH whose response body is discarded; record updates answer with
    /// `204 No Content`. Use [`Dispatcher::patch_returning`] when the
    /// resource sends a payload back.
    pub async fn patch<B>(&self, path: &str, query: &[(&str, &str)], body: &B) -> Result<(), Error>
    where
        B: Serialize + Sync + ?Sized,
    {
        let request = RequestDescriptor::new(Method::Patch, path)
            .with_query(query.iter().copied())
            .with_body(body);
        self.dispatch_discard(&request).await
    }

    /// PATCH that decodes the response body into `T`.
    pub async fn patch_returning<B, T>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, Error>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::new(Method::Patch, path)
            .with_query(query.iter().copied())
            .with_body(body);
        self.dispatch(&request).await
    }

    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<(), Error> {
        let request =
            RequestDescriptor::new(Method::Delete, path).with_query(query.iter().copied());
        self.dispatch_discard(&request).await
    }

    async fn execute<B, T, F>(
        &self,
        request: &RequestDescriptor<B>,
        classify_body: F,
    ) -> Result<T, Error>
    where
        B: Serialize + Sync,
        F: Fn(&C, &[u8]) -> Classified<T>,
    {
        let start = Instant::now();
        let mut attempts: u8 = 0;
        let mut reauthenticated = false;

        let result = loop {
            attempts += 1;
            let (body, sent_with) = match self.send_once(request, attempts).await {
                Ok(sent) => sent,
                Err(err) => break Err(err),
            };

            match classify_body(&self.codec, &body) {
                Classified::Decoded(value) => break Ok(value),
                Classified::Malformed(err) => break Err(Error::Decode(err)),
                Classified::ErrorEnvelope(errors) => {
                    if reauthenticated || !self.holder.expired(&errors) {
                        break Err(Error::Api(errors));
                    }
                    warn!(
                        method = %request.method(),
                        path = request.path(),
                        error_codes = ?errors.codes(),
                        generation = sent_with.generation,
                        "dispatch.session_expired"
                    );
                    if let Err(err) = self.holder.authenticate(&sent_with).await {
                        break Err(match err {
                            Error::Auth(msg) => Error::Auth(msg),
                            other => Error::Auth(other.to_string()),
                        });
                    }
                    reauthenticated = true;
                }
            }
        };

        DispatchOutcome {
            method: request.method(),
            path: request.path().to_string(),
            attempts,
            reauthenticated,
            success: result.is_ok(),
            elapsed: start.elapsed(),
        }
        .log();
        result
    }

    /// Validates credentials, sends one request and buffers the whole body.
    /// Returns the credentials the request was sent with alongside the body.
    async fn send_once<B>(
        &self,
        request: &RequestDescriptor<B>,
        attempt: u8,
    ) -> Result<(Vec<u8>, Credentials), Error>
    where
        B: Serialize + Sync,
    {
        self.holder.validate().await?;
        let credentials = self.holder.credentials().await;

        let uri = build_uri(
            &credentials.instance_url,
            request.path(),
            request.query_params(),
        );
        let headers = build_headers(&credentials.access_token)?;
        let mut builder = self
            .http_client
            .request(request.method().as_reqwest(), &uri)
            .headers(headers);
        if let Some(body) = request.body() {
            let bytes = self.codec.encode(body).map_err(Error::Encode)?;
            builder = builder.body(bytes);
        }

        debug!(method = %request.method(), uri = %uri, attempt, "dispatch.send");
        let resp = builder.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!(status = %status, bytes = bytes.len(), attempt, "dispatch.response");
        Ok((bytes.to_vec(), credentials))
    }
}
