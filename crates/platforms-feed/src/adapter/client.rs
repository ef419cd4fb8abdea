use std::time::Duration;

use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::error::FetchError;

pub(crate) const DEFAULT_UA: &str = concat!("platforms-feed/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout applied to adapter clients.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client builder shared by all adapters.
pub fn create_client_builder(timeout: Option<Duration>) -> ClientBuilder {
    let timeout = timeout.filter(|t| !t.is_zero()).unwrap_or(DEFAULT_TIMEOUT);
    Client::builder()
        .user_agent(DEFAULT_UA)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .pool_idle_timeout(Duration::from_secs(90))
}

/// Build a client, falling back to reqwest defaults if the builder fails.
pub fn default_client(timeout: Option<Duration>) -> Client {
    create_client_builder(timeout).build().unwrap_or_else(|e| {
        debug!(error = %e, "Failed to build adapter HTTP client; using defaults");
        Client::new()
    })
}

/// Parse a `Retry-After` header expressed in seconds.
pub fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get(header::RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after_secs(value)
}

/// Parse a delay-seconds value. Values that do not fit a [`Duration`] are ignored.
pub fn parse_retry_after_secs(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// A completed HTTP exchange, before status interpretation.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// Send a request and read the body regardless of status.
///
/// Transport failures (timeouts, connection resets) are mapped to
/// [`FetchError::Transient`].
pub async fn send_raw(request: RequestBuilder) -> Result<RawResponse, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    let retry_after = parse_retry_after(&response);
    let body = response.text().await?;
    trace!(%status, len = body.len(), "Platform response body");
    Ok(RawResponse {
        status,
        retry_after,
        body,
    })
}

/// Decode a raw response, using `classify` to turn error statuses into a [`FetchError`].
pub fn decode_json<T, F>(raw: RawResponse, classify: F) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    F: FnOnce(StatusCode, Option<Duration>, &str) -> FetchError,
{
    if !raw.status.is_success() {
        debug!(status = %raw.status, "Platform request failed");
        return Err(classify(raw.status, raw.retry_after, &raw.body));
    }
    serde_json::from_str(&raw.body).map_err(FetchError::from)
}
