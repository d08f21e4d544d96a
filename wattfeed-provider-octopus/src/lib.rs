//! Source implementation for Octopus Energy free electricity campaign events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use wattfeed_core::{
    model::{Event, SourceId, SourceMeta, Sources},
    ports::{EventSource, GraphqlExecutor, SourceError},
};

/// Authenticated GraphQL transport for the Kraken platform.
pub mod kraken;

pub use kraken::KrakenClient;

/// Octopus Energy GraphQL endpoint.
pub const GRAPHQL_ENDPOINT: &str = "https://api.octopus.energy/v1/graphql/";

const CAMPAIGN_SLUG: &str = "free_electricity";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

// Only the first page is requested; `first` bounds how many events one run can see.
const EVENTS_QUERY: &str = r"
query getFreeElectricityEnrollmentAndEvents($accountNumber: String!, $meterPointId: String!, $campaignSlug: String!) {
  isEnrolledInCustomerFlexibilityCampaign(
    accountNumber: $accountNumber
    campaignSlug: $campaignSlug
    supplyPointIdentifier: $meterPointId
  )
  customerFlexibilityCampaignEvents(
    accountNumber: $accountNumber
    campaignSlug: $campaignSlug
    supplyPointIdentifier: $meterPointId
    first: 20
  ) {
    edges {
      cursor
      node {
        code
        endAt
        isEventParticipant
        name
        startAt
        __typename
      }
      __typename
    }
    pageInfo {
      endCursor
      hasNextPage
      hasPreviousPage
      startCursor
      __typename
    }
    totalCount
    edgeCount
    __typename
  }
}
";

/// `data` member of the campaign query response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampaignData {
    #[serde(default)]
    is_enrolled_in_customer_flexibility_campaign: Option<bool>,
    customer_flexibility_campaign_events: EventConnection,
}

/// Relay-style connection of campaign events.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventConnection {
    #[serde(default)]
    edges: Vec<EventEdge>,
    #[serde(default)]
    page_info: Option<PageInfo>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EventEdge {
    node: CampaignEvent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
}

/// Single campaign event. Name, code, and participation are not carried into the feed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampaignEvent {
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    #[serde(default)]
    is_test: Option<bool>,
}

/// Account and meter the campaign query is scoped to.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// Octopus account number, e.g. `A-1234ABCD`.
    pub account_number: String,
    /// Electricity meter point administration number.
    pub meter_point_id: String,
}

/// Campaign event fetcher for one enrolled meter.
pub struct OctopusSource {
    executor: Arc<dyn GraphqlExecutor>,
    enrollment: Enrollment,
    meta: SourceMeta,
}

impl OctopusSource {
    /// Create a source running its query through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn GraphqlExecutor>, enrollment: Enrollment) -> Self {
        Self {
            executor,
            enrollment,
            meta: source_meta(),
        }
    }
}

#[async_trait]
impl EventSource for OctopusSource {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    async fn fetch(&self) -> Result<Vec<Event>, SourceError> {
        let variables = json!({
            "accountNumber": self.enrollment.account_number,
            "meterPointId": self.enrollment.meter_point_id,
            "campaignSlug": CAMPAIGN_SLUG,
        });

        let data = self.executor.execute(EVENTS_QUERY, variables).await?;
        let campaign: CampaignData = serde_json::from_value(data)?;

        if campaign.is_enrolled_in_customer_flexibility_campaign == Some(false) {
            tracing::warn!(
                account = %self.enrollment.account_number,
                "account is not enrolled in the free electricity campaign"
            );
        }

        let connection = campaign.customer_flexibility_campaign_events;
        if connection.page_info.as_ref().is_some_and(|page| page.has_next_page) {
            tracing::warn!(
                received = connection.edges.len(),
                total = connection.total_count,
                "more campaign events available than the first page returns"
            );
        }

        let events: Vec<Event> = connection
            .edges
            .into_iter()
            .map(|edge| Event::new(edge.node.start_at, edge.node.end_at, "", edge.node.is_test))
            .collect();

        if events.is_empty() {
            return Err(SourceError::Empty);
        }

        tracing::info!(count = events.len(), "fetched events from Octopus");
        Ok(events)
    }
}

/// Build the HTTP client used for the GraphQL API.
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

/// Build the Octopus source authenticating with `api_key`.
#[must_use]
pub fn source(client: Client, api_key: String, enrollment: Enrollment) -> Arc<dyn EventSource> {
    let executor = Arc::new(KrakenClient::new(client, GRAPHQL_ENDPOINT, api_key));
    Arc::new(OctopusSource::new(executor, enrollment))
}

fn source_meta() -> SourceMeta {
    SourceMeta {
        id: SourceId::from(Sources::Octopus),
        name: String::from("Octopus Energy"),
    }
}
