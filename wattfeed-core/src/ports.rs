//! Traits describing event sources, their transports, and the shared error type.

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use serde_json::{Error as JsonError, Value};

use crate::model::{Event, SourceMeta};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to an upstream source.
///
/// All of them are recoverable: the reconciler treats the source as empty for the run.
pub enum SourceError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Upstream answered with a status the source cannot use.
    #[error("Unexpected status code: {0}")]
    Status(u16),
    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] JsonError),
    /// Credentials were rejected or a token could not be obtained.
    #[error("Authentication error: {0}")]
    Auth(String),
    /// GraphQL endpoint reported errors.
    #[error("GraphQL error: {0}")]
    Graphql(String),
    /// Upstream returned no events at all.
    #[error("No events received")]
    Empty,
    /// Internal source error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
/// Minimal view of an HTTP response used by conditional fetches.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `ETag` response header, if any.
    pub etag: Option<String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

#[async_trait]
/// Upstream producing free electricity events.
pub trait EventSource: Send + Sync {
    /// Metadata describing this source.
    fn meta(&self) -> &SourceMeta;

    /// Fetch the current events from the upstream.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the upstream cannot be reached or its answer is unusable.
    async fn fetch(&self) -> Result<Vec<Event>, SourceError>;
}

#[async_trait]
/// Executes authenticated GraphQL operations.
pub trait GraphqlExecutor: Send + Sync {
    /// Run `query` with `variables` and return the `data` member of the response.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Auth`] when authentication fails, [`SourceError::Graphql`] when the
    /// response carries errors, and [`SourceError::Network`] on transport failures.
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, SourceError>;
}

#[async_trait]
/// Plain HTTP GET with `If-None-Match` support.
pub trait ConditionalGet: Send + Sync {
    /// Request `url`, sending `etag` as `If-None-Match` when present.
    ///
    /// Any status is returned as a response; only transport failures are errors.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Network`] when the request cannot be completed.
    async fn get(&self, url: &str, etag: Option<&str>) -> Result<HttpResponse, SourceError>;
}
