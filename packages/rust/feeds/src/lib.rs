//! Feed document fetching and entry resolution.
//!
//! Turns a registered [`Feed`] into candidate entries: RSS/Atom feeds are
//! fetched and parsed into one entry per syndication item; `single-url`
//! feeds resolve to exactly one synthetic entry built from the feed's own
//! fields. Deduplication against the corpus happens in the pipeline, not
//! here — this crate only produces candidates.

mod parser;

use feedloom_shared::{Feed, FeedKind, FeedloomError, Result};
use reqwest::Client;
use tracing::{debug, instrument};

pub use parser::{FeedDocMeta, FeedEntry, ParsedFeed, parse_feed_document};

/// Maximum number of redirects to follow when fetching a feed document.
const MAX_REDIRECTS: usize = 3;

/// Default timeout in seconds for feed document requests.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Maximum feed document size we consider valid (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("Feedloom/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with appropriate settings for feed resolution.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| FeedloomError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetch a feed document over HTTP.
pub async fn fetch_feed_document(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FeedloomError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedloomError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(FeedloomError::validation(format!(
                "{url}: feed document too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    response
        .text()
        .await
        .map_err(|e| FeedloomError::Network(format!("{url}: failed to read body: {e}")))
}

/// Resolve a feed into candidate entries.
///
/// For RSS feeds, returns the parsed document metadata (used by the pipeline
/// to backfill empty feed titles/descriptions) along with all entries. For
/// `single-url` feeds, returns one synthetic entry and no document metadata.
#[instrument(skip_all, fields(url = %feed.url, kind = ?feed.kind))]
pub async fn resolve_entries(
    client: &Client,
    feed: &Feed,
) -> Result<(Option<FeedDocMeta>, Vec<FeedEntry>)> {
    match feed.kind {
        FeedKind::Rss => {
            let body = fetch_feed_document(client, &feed.url).await?;
            let parsed = parse_feed_document(&body)?;
            debug!(entries = parsed.entries.len(), "feed document parsed");
            Ok((Some(parsed.meta), parsed.entries))
        }
        FeedKind::SingleUrl => {
            let entry = FeedEntry {
                title: feed.title.clone(),
                link: feed.url.clone(),
                description: feed.description.clone(),
                published_at: Some(chrono::Utc::now()),
                content: None,
            };
            Ok((None, vec![entry]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://blog.example.com</link>
    <description>Posts about examples</description>
    <item>
      <title>First Post</title>
      <link>https://blog.example.com/first</link>
      <description>The first one</description>
      <pubDate>Mon, 06 Jan 2025 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Second Post</title>
      <link>https://blog.example.com/second</link>
      <description>The second one</description>
      <pubDate>Tue, 07 Jan 2025 08:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn resolve_rss_feed_via_http() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feed.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(RSS_DOC))
            .mount(&server)
            .await;

        let feed = Feed::new(format!("{}/feed.xml", server.uri()), FeedKind::Rss);
        let client = build_client().expect("client");
        let (meta, entries) = resolve_entries(&client, &feed).await.expect("resolve");

        let meta = meta.expect("rss resolution carries doc meta");
        assert_eq!(meta.title, "Example Blog");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].link, "https://blog.example.com/first");
        assert!(entries[0].published_at.is_some());
    }

    #[tokio::test]
    async fn resolve_rss_http_error_is_network_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feed.xml"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let feed = Feed::new(format!("{}/feed.xml", server.uri()), FeedKind::Rss);
        let client = build_client().expect("client");
        let result = resolve_entries(&client, &feed).await;
        assert!(matches!(result, Err(FeedloomError::Network(_))));
    }

    #[tokio::test]
    async fn resolve_single_url_is_synthetic() {
        let mut feed = Feed::new("https://example.com/page", FeedKind::SingleUrl);
        feed.title = "A Page".into();
        feed.description = "One page".into();

        let client = build_client().expect("client");
        let (meta, entries) = resolve_entries(&client, &feed).await.expect("resolve");

        assert!(meta.is_none());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://example.com/page");
        assert_eq!(entries[0].title, "A Page");
        assert!(entries[0].published_at.is_some());
    }
}
