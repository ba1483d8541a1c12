//! Enrichment stage: normalize raw content into narration-ready text.
//!
//! Each selected item's raw content is sent through the text-service
//! gateway with the content-parse instruction. The answer must contain the
//! three-field JSON payload; anything else is a soft failure — the item is
//! left untouched and reconsidered next tick.

use feedloom_shared::{Result, StageMarker};
use feedloom_storage::Store;
use feedloom_textgen::{CONTENT_PARSE_PROMPT, Gateway, parse_enrichment};
use tracing::{debug, info, instrument, warn};

/// Run one enrichment pass over up to `batch` items.
#[instrument(skip_all, fields(batch))]
pub async fn run_enrich(store: &Store, gateway: &Gateway, model: &str, batch: u32) -> Result<()> {
    let items = store.items_awaiting_enrichment(batch).await?;
    if items.is_empty() {
        debug!("no items awaiting enrichment");
        return Ok(());
    }

    let mut enriched = 0;
    for mut item in items {
        let completion = gateway
            .complete(model, &item.content, CONTENT_PARSE_PROMPT)
            .await;

        if !completion.is_success() {
            warn!(
                url = %item.url,
                status = completion.status_code,
                error = completion.error.as_deref().unwrap_or(""),
                "enrichment completion failed, skipping this tick"
            );
            continue;
        }

        let payload = match parse_enrichment(&completion.answer) {
            Ok(p) => p,
            Err(e) => {
                warn!(url = %item.url, error = %e, "unparseable enrichment answer, skipping this tick");
                continue;
            }
        };

        if payload.content.is_empty() {
            warn!(url = %item.url, "enrichment returned empty content, skipping this tick");
            continue;
        }

        item.ai_content = payload.content;
        item.ai_summary = payload.summary;
        item.tags = payload.tags;
        item.advance_stage(StageMarker::Enriched);
        item.touch();

        match store.update_item(&item).await {
            Ok(()) => enriched += 1,
            Err(e) => warn!(url = %item.url, error = %e, "failed to persist enriched item"),
        }
    }

    info!(enriched, "enrichment pass complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedloom_shared::{Feed, FeedKind, Item};
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_store() -> Store {
        let tmp = std::env::temp_dir().join(format!("fl_enrich_{}.db", Uuid::now_v7()));
        Store::open(&tmp).await.expect("open test db")
    }

    fn fetched_item(url: &str) -> Item {
        let feed = Feed::new("https://example.com/feed.xml", FeedKind::Rss);
        let mut item = Item::from_feed_entry(&feed.id, url, "Title", None);
        item.content = "# Raw markdown\nwith [a link](https://x) and text".into();
        item.is_active = true;
        item.stage = StageMarker::Fetched;
        item
    }

    fn answer_with(answer: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": answer}}]
        })
    }

    async fn gateway_for(server: &MockServer) -> Gateway {
        Gateway::new(format!("{}/v1", server.uri()), "test-token")
            .unwrap()
            .with_retry(1, 1)
    }

    #[tokio::test]
    async fn enriches_item_from_prose_wrapped_payload() {
        let server = MockServer::start().await;
        let answer = r#"Here is your processed document:
{"tags":["tech"],"abstract":"s","content":"c"}
Hope this helps!"#;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer_with(answer)))
            .mount(&server)
            .await;

        let store = test_store().await;
        let item = fetched_item("https://example.com/a");
        store.insert_item(&item).await.unwrap();

        let gateway = gateway_for(&server).await;
        run_enrich(&store, &gateway, "gpt-4o-mini", 10)
            .await
            .expect("enrich");

        let item = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(item.ai_content, "c");
        assert_eq!(item.ai_summary, "s");
        assert_eq!(item.tags, vec!["tech"]);
        assert_eq!(item.stage, StageMarker::Enriched);
    }

    #[tokio::test]
    async fn gateway_failure_leaves_item_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = test_store().await;
        let item = fetched_item("https://example.com/a");
        store.insert_item(&item).await.unwrap();

        let gateway = gateway_for(&server).await;
        run_enrich(&store, &gateway, "gpt-4o-mini", 10)
            .await
            .expect("enrich");

        let item = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(item.stage, StageMarker::Fetched);
        assert!(item.ai_content.is_empty());

        // Still eligible next tick.
        assert_eq!(store.items_awaiting_enrichment(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_soft_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(answer_with("I could not produce JSON, sorry.")),
            )
            .mount(&server)
            .await;

        let store = test_store().await;
        let item = fetched_item("https://example.com/a");
        store.insert_item(&item).await.unwrap();

        let gateway = gateway_for(&server).await;
        run_enrich(&store, &gateway, "gpt-4o-mini", 10)
            .await
            .expect("enrich");

        let item = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(item.stage, StageMarker::Fetched);
        assert!(item.ai_content.is_empty());
    }

    #[tokio::test]
    async fn never_selects_items_already_enriched() {
        let store = test_store().await;
        let mut item = fetched_item("https://example.com/a");
        item.ai_content = "already clean".into();
        item.stage = StageMarker::Enriched;
        store.insert_item(&item).await.unwrap();

        // Unreachable gateway: the pass must not make any call.
        let gateway = Gateway::new("http://127.0.0.1:1/v1", "t")
            .unwrap()
            .with_retry(1, 1);
        run_enrich(&store, &gateway, "gpt-4o-mini", 10)
            .await
            .expect("enrich");

        let item = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(item.ai_content, "already clean");
    }
}
