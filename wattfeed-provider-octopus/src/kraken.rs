//! GraphQL over HTTP with Kraken API-key token exchange.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use wattfeed_core::ports::{GraphqlExecutor, SourceError};

const OBTAIN_TOKEN_MUTATION: &str = r"
mutation obtainKrakenToken($input: ObtainJSONWebTokenInput!) {
  obtainKrakenToken(input: $input) {
    token
    refreshToken
    refreshExpiresIn
  }
}
";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Serialize)]
struct GraphqlRequest<'req> {
    query: &'req str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObtainTokenData {
    obtain_kraken_token: TokenPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    token: String,
    refresh_expires_in: i64,
}

#[derive(Debug, Clone)]
struct KrakenToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl KrakenToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::minutes(EXPIRY_MARGIN_MINUTES) < self.expires_at
    }
}

/// [`GraphqlExecutor`] that exchanges an API key for a JWT and sends it with every query.
pub struct KrakenClient {
    client: Client,
    endpoint: String,
    api_key: String,
    token: RwLock<Option<KrakenToken>>,
}

impl KrakenClient {
    /// Create a client for `endpoint`. No request is made until the first query.
    #[must_use]
    pub fn new<E: Into<String>>(client: Client, endpoint: E, api_key: String) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            token: RwLock::new(None),
        }
    }

    async fn bearer(&self) -> Result<String, SourceError> {
        if let Some(token) = self
            .token
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_fresh(Utc::now()))
        {
            return Ok(token.value.clone());
        }

        let mut slot = self.token.write().await;
        // Another caller may have refreshed while we waited for the write lock.
        if let Some(token) = slot.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let fresh = self.obtain_token().await?;
        let value = fresh.value.clone();
        *slot = Some(fresh);
        Ok(value)
    }

    async fn obtain_token(&self) -> Result<KrakenToken, SourceError> {
        let variables = json!({ "input": { "APIKey": self.api_key } });
        let data = self
            .post(OBTAIN_TOKEN_MUTATION, variables, None)
            .await
            .map_err(|err| SourceError::Auth(format!("failed to obtain token: {err}")))?;

        let payload: ObtainTokenData = serde_json::from_value(data)
            .map_err(|err| SourceError::Auth(format!("unexpected token response: {err}")))?;
        let TokenPayload {
            token,
            refresh_expires_in,
        } = payload.obtain_kraken_token;

        tracing::debug!(expires_in = refresh_expires_in, "obtained kraken token");
        Ok(KrakenToken {
            value: token,
            expires_at: token_expiry(Utc::now(), refresh_expires_in)?,
        })
    }

    async fn post(
        &self,
        query: &str,
        variables: Value,
        authorization: Option<&str>,
    ) -> Result<Value, SourceError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&GraphqlRequest { query, variables });
        if let Some(token) = authorization {
            req = req.header(AUTHORIZATION, token);
        }

        let resp = req.send().await.map_err(SourceError::from)?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Auth(format!("rejected with {status}")));
        }

        let body: GraphqlResponse = resp
            .error_for_status()
            .map_err(SourceError::from)?
            .json()
            .await
            .map_err(SourceError::from)?;

        graphql_data(body)
    }
}

#[async_trait]
impl GraphqlExecutor for KrakenClient {
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, SourceError> {
        let token = self.bearer().await?;
        self.post(query, variables, Some(&token)).await
    }
}

fn token_expiry(now: DateTime<Utc>, lifetime_secs: i64) -> Result<DateTime<Utc>, SourceError> {
    Duration::try_seconds(lifetime_secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| SourceError::Auth(format!("token lifetime out of range: {lifetime_secs}s")))
}

fn graphql_data(body: GraphqlResponse) -> Result<Value, SourceError> {
    if !body.errors.is_empty() {
        let messages: Vec<String> = body.errors.into_iter().map(|entry| entry.message).collect();
        return Err(SourceError::Graphql(messages.join("; ")));
    }

    body.data
        .ok_or_else(|| SourceError::Graphql("response carried no data".to_owned()))
}
