//! HTTP feed source tests against a local mock server.

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rssfeed::config::{FetcherConfig, RefreshConfig};
use rssfeed::feed::{
    EntryFilter, EntryRepository, EscalationReason, FeedSource, FeedStatus, HttpFeedSource,
    RefreshOutcome,
};
use rssfeed::{Database, FeedService, LogNotifier, NewUser, RefreshEngine, RssfeedError, UserRepository};

fn sample_rss() -> String {
    let now = chrono::Utc::now();
    let hour = chrono::Duration::hours(1);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>http://example.com/</link>
    <description>Test description</description>
    <pubDate>{}</pubDate>
    <item>
      <title>Item 1</title>
      <link>http://example.com/1</link>
      <guid>item-1</guid>
      <pubDate>{}</pubDate>
      <description>&lt;b&gt;First&lt;/b&gt;</description>
    </item>
    <item>
      <title>Item 2</title>
      <link>http://example.com/2</link>
      <guid>item-2</guid>
      <pubDate>{}</pubDate>
      <description>Second</description>
    </item>
  </channel>
</rss>"#,
        now.to_rfc2822(),
        (now - hour).to_rfc2822(),
        (now - hour * 2).to_rfc2822(),
    )
}

fn local_config() -> FetcherConfig {
    FetcherConfig {
        allow_private_hosts: true,
        ..FetcherConfig::default()
    }
}

async fn serve(server: &MockServer, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_parses_document() {
    let server = MockServer::start().await;
    serve(&server, 200, sample_rss()).await;

    let source = HttpFeedSource::new(local_config()).unwrap();
    let feed = source
        .fetch(&format!("{}/feed", server.uri()))
        .await
        .unwrap();

    assert_eq!(feed.title.as_deref(), Some("Test Feed"));
    assert!(feed.published.is_some());
    assert_eq!(feed.entries.len(), 2);
    assert_eq!(feed.entries[0].id.as_deref(), Some("item-1"));
    assert_eq!(feed.entries[0].description.as_deref(), Some("First"));
}

#[tokio::test]
async fn test_http_error_is_fetch_error() {
    let server = MockServer::start().await;
    serve(&server, 500, "oops".to_string()).await;

    let source = HttpFeedSource::new(local_config()).unwrap();
    let err = source
        .fetch(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, RssfeedError::Fetch(_)));
    assert!(err.to_string().contains("HTTP error"));
}

#[tokio::test]
async fn test_malformed_document_is_fetch_error() {
    let server = MockServer::start().await;
    serve(&server, 200, "<html><body>not a feed</body></html>".to_string()).await;

    let source = HttpFeedSource::new(local_config()).unwrap();
    let err = source
        .fetch(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, RssfeedError::Fetch(_)));
}

#[tokio::test]
async fn test_oversized_document_is_rejected() {
    let server = MockServer::start().await;
    serve(&server, 200, sample_rss()).await;

    let config = FetcherConfig {
        max_feed_size_bytes: 64,
        ..local_config()
    };
    let source = HttpFeedSource::new(config).unwrap();
    let err = source
        .fetch(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("feed too large"));
}

#[tokio::test]
async fn test_private_host_blocked_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_rss()))
        .expect(0)
        .mount(&server)
        .await;

    let source = HttpFeedSource::new(FetcherConfig::default()).unwrap();
    let err = source
        .fetch(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("private IP"));
}

#[tokio::test]
async fn test_subscribe_and_refresh_over_http() {
    let server = MockServer::start().await;
    serve(&server, 200, sample_rss()).await;

    let db = Arc::new(Database::open_in_memory().await.unwrap());
    let user = UserRepository::new(db.pool())
        .create(&NewUser::new("alice", "alice@example.com"))
        .await
        .unwrap();
    let engine = RefreshEngine::new(
        db,
        Arc::new(HttpFeedSource::new(local_config()).unwrap()),
        Arc::new(LogNotifier),
        RefreshConfig {
            retry_delay_secs: 0,
            ..RefreshConfig::default()
        },
    );
    let service = FeedService::new(Arc::new(engine));

    let outcome = service
        .subscribe(user.id, &format!("{}/feed", server.uri()))
        .await
        .unwrap();
    assert_eq!(outcome.feed.title.as_deref(), Some("Test Feed"));
    let refreshed = outcome.initial_refresh.unwrap().handle.await.unwrap();
    assert_eq!(refreshed, RefreshOutcome::Updated { new_entries: 2 });

    let feeds = service.list_subscriptions(user.id).await.unwrap();
    assert_eq!(feeds[0].status, FeedStatus::Updated);

    let entries = service
        .list_entries(user.id, &EntryFilter::new())
        .await
        .unwrap();
    let guids: Vec<&str> = entries.iter().map(|e| e.guid.as_str()).collect();
    assert_eq!(guids, vec!["item-1", "item-2"]);
}

#[tokio::test]
async fn test_item_without_guid_escalates_feed() {
    let now = chrono::Utc::now();
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Partial Feed</title>
    <pubDate>{now}</pubDate>
    <item><guid>kept-1</guid><title>One</title><pubDate>{now}</pubDate></item>
    <item><title>No guid</title><link>http://example.com/none</link><pubDate>{now}</pubDate></item>
    <item><guid>kept-2</guid><title>Two</title><pubDate>{now}</pubDate></item>
  </channel>
</rss>"#,
        now = now.to_rfc2822()
    );
    let server = MockServer::start().await;
    serve(&server, 200, body).await;

    let db = Arc::new(Database::open_in_memory().await.unwrap());
    let user = UserRepository::new(db.pool())
        .create(&NewUser::new("alice", "alice@example.com"))
        .await
        .unwrap();
    let engine = Arc::new(RefreshEngine::new(
        db.clone(),
        Arc::new(HttpFeedSource::new(local_config()).unwrap()),
        Arc::new(LogNotifier),
        RefreshConfig {
            maximum_retry: 1,
            retry_delay_secs: 0,
            ..RefreshConfig::default()
        },
    ));
    let service = FeedService::new(engine.clone());

    let outcome = service
        .subscribe(user.id, &format!("{}/feed", server.uri()))
        .await
        .unwrap();
    let feed_id = outcome.feed.id;
    let refreshed = outcome.initial_refresh.unwrap().handle.await.unwrap();
    assert_eq!(
        refreshed,
        RefreshOutcome::Escalated {
            reason: EscalationReason::EntriesFailed { failed: 1 },
            notified: true,
        }
    );

    let entries = EntryRepository::new(db.pool());
    assert_eq!(entries.count_by_feed(feed_id).await.unwrap(), 2);

    // A second pass over the same document stores nothing new
    let again = engine.refresh(feed_id).await;
    assert!(matches!(
        again,
        RefreshOutcome::Escalated { notified: false, .. }
    ));
    assert_eq!(entries.count_by_feed(feed_id).await.unwrap(), 2);

    let feeds = service.list_subscriptions(user.id).await.unwrap();
    assert_eq!(feeds[0].status, FeedStatus::Error);
}
