//! HTTP(S) download of import payloads.
//!
//! The client follows redirects (bounded) and enforces the connect and read
//! timeouts it is given. Non-2xx statuses are returned, not raised, so the
//! caller decides how to report them.

use crate::error::{Error, Result};
use crate::repository::{FetchClient, FetchResponse, FetchTimeouts};
use log::debug;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::io::Read;

/// Redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Blocking HTTP client backed by `reqwest`.
#[derive(Debug, Default)]
pub struct HttpFetchClient {
    user_agent: Option<String>,
}

impl HttpFetchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(user_agent: &str) -> Self {
        Self {
            user_agent: Some(user_agent.to_string()),
        }
    }

    fn client(&self, timeouts: &FetchTimeouts, url: &str) -> Result<Client> {
        let mut builder = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.read)
            .redirect(Policy::limited(MAX_REDIRECTS));
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder.build().map_err(|e| Error::Fetch {
            url: url.to_string(),
            message: format!("Failed to build HTTP client: {}", e),
        })
    }
}

impl FetchClient for HttpFetchClient {
    fn get(&self, url: &str, timeouts: &FetchTimeouts) -> Result<FetchResponse> {
        debug!("Fetching {}", url);
        let client = self.client(timeouts, url)?;
        let mut response = client.get(url).send().map_err(|e| Error::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        response.read_to_end(&mut body).map_err(|e| Error::Fetch {
            url: url.to_string(),
            message: format!("Failed to read response body: {}", e),
        })?;
        debug!("Fetched {} bytes from {} (status {})", body.len(), url, status);

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_builds_with_timeouts() {
        let client = HttpFetchClient::with_user_agent("cms-transform-test");
        let timeouts = FetchTimeouts {
            connect: Duration::from_millis(50),
            read: Duration::from_millis(50),
        };
        assert!(client.client(&timeouts, "http://localhost/").is_ok());
    }

    #[test]
    fn test_unreachable_host_is_fetch_error() {
        let client = HttpFetchClient::new();
        let timeouts = FetchTimeouts {
            connect: Duration::from_millis(200),
            read: Duration::from_millis(200),
        };
        // Port 9 (discard) on localhost is closed in test environments.
        let err = client.get("http://127.0.0.1:9/doc.xml", &timeouts).unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_url_is_fetch_error() {
        let client = HttpFetchClient::new();
        let err = client
            .get("not a url", &FetchTimeouts::default())
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
