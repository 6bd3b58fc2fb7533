//! Shared HTTP client for the claim-queue service and issuer claim links.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::config::NetworkConfig;
use crate::error::ClaimKitError;

/// A thin wrapper on an HTTP client. Applies the configured timeout and user-agent,
/// refuses plain-text URLs, and retries transient failures with exponential backoff.
#[derive(Debug, Clone)]
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Default for Request {
    fn default() -> Self {
        Self::new(&NetworkConfig::default())
    }
}

impl Request {
    /// Initializes a new `Request` instance.
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    /// Creates a request builder with defaults applied.
    fn req(&self, method: Method, url: &str) -> Result<RequestBuilder, ClaimKitError> {
        #[cfg(not(test))]
        if !url.starts_with("https://") {
            return Err(ClaimKitError::InvalidInput {
                attribute: "url".to_string(),
                reason: format!("refusing non-https url {url}"),
            });
        }

        Ok(self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("claimkit-core/{}", env!("CARGO_PKG_VERSION")),
            ))
    }

    /// Creates a GET request builder with defaults applied.
    pub(crate) fn get(&self, url: &str) -> Result<RequestBuilder, ClaimKitError> {
        self.req(Method::GET, url)
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> Result<RequestBuilder, ClaimKitError> {
        self.req(Method::POST, url)
    }

    /// Sends a request to the claim-queue service or an issuer endpoint.
    ///
    /// Timeouts, refused connections, 429 and 5xx responses are retried with
    /// exponential backoff. Any other response is handed back as-is, so the
    /// caller decides what its status means.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, ClaimKitError> {
        let Some(template) = request_builder.try_clone() else {
            return send_once(request_builder).await.map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let attempt = template.try_clone().ok_or_else(|| SendFailure {
                url: "<unknown>".to_string(),
                status: None,
                error: "streaming request body cannot be resent".to_string(),
                transient: false,
            })?;
            send_once(attempt).await
        })
        .retry(backoff)
        .when(|failure: &SendFailure| failure.transient)
        .notify(|failure, delay| {
            log::debug!("claim endpoint {} retry in {delay:?}: {}", failure.url, failure.error);
        })
        .await
        .map_err(Into::into)
    }
}

/// Why one attempt at reaching a claim endpoint failed.
#[derive(Debug)]
struct SendFailure {
    url: String,
    status: Option<u16>,
    error: String,
    /// Whether another attempt may succeed.
    transient: bool,
}

impl From<SendFailure> for ClaimKitError {
    fn from(failure: SendFailure) -> Self {
        Self::RemoteUnavailable {
            url: failure.url,
            status: failure.status,
            error: failure.error,
        }
    }
}

async fn send_once(request_builder: RequestBuilder) -> Result<Response, SendFailure> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| SendFailure {
        url: err
            .url()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
        status: None,
        error: format!("malformed claim request: {err}"),
        transient: false,
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || resp.status().is_server_error() {
                return Err(SendFailure {
                    url,
                    status: Some(status),
                    error: format!("claim endpoint answered {status}"),
                    transient: true,
                });
            }
            Ok(resp)
        }
        Err(err) => Err(SendFailure {
            url,
            status: None,
            transient: err.is_timeout() || err.is_connect(),
            error: format!("claim endpoint unreachable: {err}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_request() -> Request {
        Request::new(&NetworkConfig {
            timeout: Duration::from_secs(2),
            max_retries: 2,
        })
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let request = fast_request();
        let url = format!("{}/missing", server.url());
        let response = request.handle(request.get(&url).unwrap()).await.unwrap();

        assert_eq!(response.status().as_u16(), 404);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_remote_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/down")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let request = fast_request();
        let url = format!("{}/down", server.url());
        let err = request
            .handle(request.post(&url).unwrap())
            .await
            .unwrap_err();

        mock.assert_async().await;
        match err {
            ClaimKitError::RemoteUnavailable { status, .. } => assert_eq!(status, Some(500)),
            other => panic!("expected RemoteUnavailable, got {other:?}"),
        }
    }
}
