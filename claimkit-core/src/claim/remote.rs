//! Clients for the remote claim-queue service and for direct ticket retrieval.
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::ClaimKitError;
use crate::http_request::Request;

use super::ticket::{unix_now, ClaimTicket};

/// A ticket as sent to `enqueue` and `enqueue-batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTicket {
    /// Redemption token.
    pub token: String,
    /// Direct retrieval URL.
    pub url: String,
    /// Expiry in Unix seconds, if any.
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl From<&ClaimTicket> for RemoteTicket {
    fn from(ticket: &ClaimTicket) -> Self {
        Self {
            token: ticket.token.clone(),
            url: ticket.url.clone(),
            expires_at: ticket.expires_at,
        }
    }
}

impl RemoteTicket {
    /// Converts to a local ticket saved now.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimKitError::InvalidTicket`] if the remote token is malformed.
    pub fn into_ticket(self) -> Result<ClaimTicket, ClaimKitError> {
        let ticket = ClaimTicket::new(self.token, self.url)?;
        Ok(ClaimTicket {
            expires_at: self.expires_at,
            saved_at: unix_now(),
            ..ticket
        })
    }
}

/// A signed credential as returned by the claim endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClaimPayload {
    /// Compact JWS.
    #[serde(default)]
    pub jws: Option<String>,
    /// Issuer digest.
    #[serde(default)]
    pub digest: Option<String>,
}

impl ClaimPayload {
    /// The trimmed JWS, if present and non-empty.
    #[must_use]
    pub fn signed_token(&self) -> Option<&str> {
        self.jws.as_deref().map(str::trim).filter(|jws| !jws.is_empty())
    }
}

/// One per-ticket outcome of `redeem-all`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedeemResult {
    /// The ticket the result is for.
    pub token: String,
    /// Whether the service redeemed it.
    #[serde(default)]
    pub ok: bool,
    /// The credential, when redeemed.
    #[serde(default)]
    pub payload: Option<ClaimPayload>,
}

/// Body of a `redeem-all` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedeemAllResponse {
    /// Number of tickets the service attempted.
    #[serde(default)]
    pub count: usize,
    /// Per-ticket outcomes.
    #[serde(default)]
    pub results: Vec<RedeemResult>,
}

#[derive(Serialize)]
struct EnqueueBatch<'a> {
    items: &'a [RemoteTicket],
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<RemoteTicket>,
}

/// Client for the holder's remote claim queue.
///
/// Every call needs a complete [`RemoteConfig`]; without one it fails with
/// [`ClaimKitError::NoServerConfig`] before touching the network. A response
/// that is not a 2xx or cannot be parsed is reported as
/// [`ClaimKitError::RemoteUnavailable`].
#[derive(Debug, Clone, Default)]
pub struct RemoteQueueClient {
    request: Request,
}

impl RemoteQueueClient {
    /// Creates a client using `request` for all calls.
    #[must_use]
    pub const fn new(request: Request) -> Self {
        Self { request }
    }

    /// `POST enqueue`.
    ///
    /// # Errors
    ///
    /// Returns `NoServerConfig` or `RemoteUnavailable`.
    pub async fn enqueue(
        &self,
        config: &RemoteConfig,
        ticket: &ClaimTicket,
    ) -> Result<(), ClaimKitError> {
        self.post(config, "enqueue", &RemoteTicket::from(ticket))
            .await
            .map(drop)
    }

    /// `POST enqueue-batch`.
    ///
    /// # Errors
    ///
    /// Returns `NoServerConfig` or `RemoteUnavailable`.
    pub async fn enqueue_batch(
        &self,
        config: &RemoteConfig,
        tickets: &[ClaimTicket],
    ) -> Result<(), ClaimKitError> {
        let items: Vec<RemoteTicket> = tickets.iter().map(RemoteTicket::from).collect();
        self.post(config, "enqueue-batch", &EnqueueBatch { items: &items })
            .await
            .map(drop)
    }

    /// `GET list`.
    ///
    /// # Errors
    ///
    /// Returns `NoServerConfig` or `RemoteUnavailable`.
    pub async fn list(&self, config: &RemoteConfig) -> Result<Vec<RemoteTicket>, ClaimKitError> {
        let (base, token) = config.resolve()?;
        let url = format!("{base}/list");
        let builder = self.request.get(&url)?.bearer_auth(token);
        let response = self.send(&url, builder).await?;
        let list: ListResponse = parse_json(&url, response).await?;
        Ok(list.items)
    }

    /// `POST redeem-all`: asks the service to redeem every ticket it holds.
    ///
    /// # Errors
    ///
    /// Returns `NoServerConfig` or `RemoteUnavailable`.
    pub async fn redeem_all(
        &self,
        config: &RemoteConfig,
    ) -> Result<RedeemAllResponse, ClaimKitError> {
        let url = config.resolve().map(|(base, _)| format!("{base}/redeem-all"))?;
        let response = self.post(config, "redeem-all", &serde_json::json!({})).await?;
        parse_json(&url, response).await
    }

    /// Fetches a ticket's credential directly from its URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimKitError::TicketFetchFailed`] on any network error, non-2xx
    /// status, unparseable body or missing signed token.
    pub async fn fetch_direct(&self, ticket: &ClaimTicket) -> Result<ClaimPayload, ClaimKitError> {
        let failed = |reason: String| ClaimKitError::TicketFetchFailed {
            token: ticket.token.clone(),
            reason,
        };

        let builder = self
            .request
            .get(&ticket.url)
            .map_err(|e| failed(e.to_string()))?
            .header("Accept", "application/json");
        let response = self
            .send(&ticket.url, builder)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let payload: ClaimPayload = parse_json(&ticket.url, response)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if payload.signed_token().is_none() {
            return Err(failed("response carries no signed token".to_string()));
        }
        Ok(payload)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        config: &RemoteConfig,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ClaimKitError> {
        let (base, token) = config.resolve()?;
        let url = format!("{base}/{path}");
        let builder = self.request.post(&url)?.bearer_auth(token).json(body);
        self.send(&url, builder).await
    }

    async fn send(
        &self,
        url: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClaimKitError> {
        let response = self.request.handle(builder).await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ClaimKitError::RemoteUnavailable {
                url: url.to_string(),
                status: Some(status.as_u16()),
                error: format!("request failed: {error_body}"),
            });
        }
        Ok(response)
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T, ClaimKitError> {
    response
        .json()
        .await
        .map_err(|e| ClaimKitError::RemoteUnavailable {
            url: url.to_string(),
            status: None,
            error: format!("unparseable response: {e}"),
        })
}
