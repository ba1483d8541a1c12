//! Content fetching capability for the pipeline's fetch stage.
//!
//! The pipeline depends only on the [`ContentFetcher`] trait — a black box
//! that turns a URL into narration-friendly text. [`HttpContentFetcher`] is
//! the production implementation: HTTP GET, content-region extraction, and
//! HTML → Markdown conversion via `htmd`.

mod extract;

use std::time::Duration;

use feedloom_shared::{FeedloomError, Result};
use reqwest::Client;
use tracing::{debug, instrument};

pub use extract::html_to_markdown;

/// User-Agent string for content requests.
const USER_AGENT: &str = concat!("Feedloom/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for content fetches.
const FETCH_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// ContentFetcher
// ---------------------------------------------------------------------------

/// Capability contract: retrieve the text content behind a URL.
///
/// Errors are returned for network failures, non-2xx responses, and
/// conversion failures; the caller decides retry policy.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// HttpContentFetcher
// ---------------------------------------------------------------------------

/// HTTP-backed content fetcher producing Markdown.
pub struct HttpContentFetcher {
    client: Client,
}

impl HttpContentFetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedloomError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl ContentFetcher for HttpContentFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedloomError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedloomError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedloomError::Network(format!("{url}: body read failed: {e}")))?;

        let markdown = html_to_markdown(&body)?;
        debug!(html_len = body.len(), md_len = markdown.len(), "content converted");
        Ok(markdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_and_converts_page() {
        let server = wiremock::MockServer::start().await;
        let page = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main>
                <h1>Quarterly Update</h1>
                <p>Shipments rose in the last quarter.</p>
            </main>
            <footer>Copyright</footer>
        </body></html>"#;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/post"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let fetcher = HttpContentFetcher::new().expect("fetcher");
        let md = fetcher
            .fetch(&format!("{}/post", server.uri()))
            .await
            .expect("fetch");

        assert!(md.contains("# Quarterly Update"));
        assert!(md.contains("Shipments rose"));
        // Navigation chrome is stripped before conversion.
        assert!(!md.contains("Copyright"));
    }

    #[tokio::test]
    async fn http_error_surfaces_as_network_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/gone"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpContentFetcher::new().expect("fetcher");
        let result = fetcher.fetch(&format!("{}/gone", server.uri())).await;
        assert!(matches!(result, Err(FeedloomError::Network(_))));
    }
}
