use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::error::ClientError;

const DEFAULT_USER_AGENT: &str = concat!("vigia-client/", env!("CARGO_PKG_VERSION"));

/// Interval between alert polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Maximum number of alert events retained, newest first.
pub const DEFAULT_ALERT_CAPACITY: usize = 10;

/// Configurable options for the dashboard client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the appliance backend.
    pub base_url: Url,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Per-request timeout for control and polling calls. Never applied to
    /// the streaming request, which is open-ended by design.
    pub request_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Custom default headers merged into every request.
    pub headers: HeaderMap,

    /// Interval between alert polls.
    pub poll_interval: Duration,

    /// Alert log capacity.
    pub alert_capacity: usize,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: Self::default_headers(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
        }
    }

    pub fn parse_base_url(input: &str) -> Result<Url, ClientError> {
        input
            .parse::<Url>()
            .map_err(|e| ClientError::invalid_url(input, e.to_string()))
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        headers
    }
}

/// Create a reqwest Client with the provided configuration.
pub fn create_client(config: &ClientConfig) -> Result<Client, ClientError> {
    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(reqwest::redirect::Policy::limited(10));

    if !config.connect_timeout.is_zero() {
        builder = builder.connect_timeout(config.connect_timeout);
    }

    builder.build().map_err(ClientError::from)
}
