// # HTTP Content Source
//
// This crate provides an HTTP-based content source for the snapwatch
// monitoring system.
//
// ## Purpose
//
// Fetches the body of a URL as text, mapping transport failures onto the
// acquisition error taxonomy so per-job error policies (ignore connection
// errors, ignore status ranges) can classify them.
//
// ## Architecture
//
// One `HttpSource` per job, constructed at job-load time. The reqwest
// client carries no timeout of its own; the runner enforces the per-job
// timeout and the source only needs to be cancellation-safe.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use snapwatch_core::traits::ContentSource;
use snapwatch_core::AcquireError;

/// Fallback connect timeout; distinct from the per-job acquisition timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_USER_AGENT: &str = concat!("snapwatch/", env!("CARGO_PKG_VERSION"));

/// HTTP(S) content source for one job
pub struct HttpSource {
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source for the given URL
    pub fn new(url: impl Into<String>) -> Result<Self, AcquireError> {
        Self::with_headers(url, HashMap::new())
    }

    /// Create a source with extra request headers (auth, accept, cookies)
    pub fn with_headers(
        url: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> Result<Self, AcquireError> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AcquireError::other(format!("cannot build http client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            headers,
            client,
        })
    }

    fn classify(err: reqwest::Error) -> AcquireError {
        if err.is_timeout() {
            AcquireError::Timeout(CONNECT_TIMEOUT.as_secs())
        } else if err.is_connect() || err.is_request() {
            AcquireError::connection(err.to_string())
        } else {
            AcquireError::other(err.to_string())
        }
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<String, AcquireError> {
        let mut request = self.client.get(&self.url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(Self::classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(Self::classify)?;
        debug!(url = %self.url, bytes = body.len(), "fetched content");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_the_url() {
        let source = HttpSource::new("https://example.org/page").unwrap();
        assert_eq!(source.location(), "https://example.org/page");
    }

    #[tokio::test]
    async fn unreachable_host_classifies_as_connection_error() {
        // Reserved TLD, guaranteed not to resolve
        let source = HttpSource::new("http://host.invalid/").unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(
            err,
            AcquireError::Connection(_) | AcquireError::Other(_)
        ));
    }
}
