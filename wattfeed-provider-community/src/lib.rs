//! Source implementation for the public community free electricity feed.
//!
//! The feed publishes the same document shape wattfeed writes, and supports `ETag` revalidation,
//! so unchanged polls cost a 304 and are answered from the local cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};

use wattfeed_core::{
    cache::ConditionalCache,
    feed::FeedDocument,
    model::{Event, SourceId, SourceMeta, Sources},
    ports::{ConditionalGet, EventSource, HttpResponse, SourceError},
};

/// Public feed location.
pub const FEED_URL: &str = "https://oe-api.davidskendall.co.uk/free_electricity.json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client used for the feed.
///
/// # Errors
///
/// Returns a [`reqwest::Error`] when the TLS backend cannot be initialised.
pub fn http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(REQUEST_TIMEOUT)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .pool_max_idle_per_host(10)
        .build()
}

/// [`ConditionalGet`] backed by `reqwest`.
pub struct ReqwestGet {
    client: Client,
}

impl ReqwestGet {
    /// Wrap an HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConditionalGet for ReqwestGet {
    async fn get(&self, url: &str, etag: Option<&str>) -> Result<HttpResponse, SourceError> {
        let mut req = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(token) = etag {
            req = req.header(IF_NONE_MATCH, token);
        }

        let resp = req.send().await.map_err(SourceError::from)?;
        let status = resp.status().as_u16();
        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = resp.bytes().await.map_err(SourceError::from)?.to_vec();

        Ok(HttpResponse { status, etag, body })
    }
}

/// Conditional fetcher for the community feed.
pub struct CommunitySource {
    http: Arc<dyn ConditionalGet>,
    cache: ConditionalCache,
    url: String,
    meta: SourceMeta,
}

impl CommunitySource {
    /// Create a source reading [`FEED_URL`] through `http`, revalidating against `cache`.
    #[must_use]
    pub fn new(http: Arc<dyn ConditionalGet>, cache: ConditionalCache) -> Self {
        Self {
            http,
            cache,
            url: FEED_URL.to_owned(),
            meta: source_meta(),
        }
    }

    /// Point the source at a different feed location.
    #[must_use]
    pub fn with_url<U: Into<String>>(mut self, url: U) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl EventSource for CommunitySource {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    async fn fetch(&self) -> Result<Vec<Event>, SourceError> {
        let cached = self.cache.load();

        let resp = self.http.get(&self.url, cached.etag.as_deref()).await?;

        if resp.status == StatusCode::NOT_MODIFIED.as_u16() {
            tracing::info!(
                status = resp.status,
                count = cached.events.len(),
                "community feed unchanged"
            );
            return Ok(cached.events);
        }
        if resp.status != StatusCode::OK.as_u16() {
            return Err(SourceError::Status(resp.status));
        }

        let (events, skipped) = FeedDocument::decode_lenient(&resp.body)?;
        if skipped > 0 {
            tracing::debug!(skipped, "skipped malformed community entries");
        }

        self.cache.store(resp.etag.as_deref(), &events);

        tracing::info!(count = events.len(), "fetched events from community feed");
        Ok(events)
    }
}

/// Build the community source with its own HTTP client.
#[must_use]
pub fn source(client: Client, cache: ConditionalCache) -> Arc<dyn EventSource> {
    Arc::new(CommunitySource::new(Arc::new(ReqwestGet::new(client)), cache))
}

fn source_meta() -> SourceMeta {
    SourceMeta {
        id: SourceId::from(Sources::Community),
        name: String::from("Community feed"),
    }
}
