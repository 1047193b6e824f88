//! Integration tests for the HTTP fetchers and the collector wrapped around them.
//!
//! Each test stands up a `wiremock` server so no real network traffic is made.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rivalscope_core::{SourceKind, SourcePayload, SourceStatus};
use rivalscope_sources::{
    build_http_client, synthetic_payload, CollectorPolicy, NewsFetcher, ReviewsFetcher,
    SocialFetcher, SourceCollector, SourceError, SourceFetcher, WebsiteFetcher,
};

fn client() -> reqwest::Client {
    build_http_client(5, "rivalscope-test/0.1").expect("failed to build test client")
}

fn no_retry_policy() -> CollectorPolicy {
    CollectorPolicy {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        backoff_base_ms: 0,
        min_interval: Duration::ZERO,
        burst: 1,
    }
}

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item><title>Acme wins award</title><description>Great quarter</description></item>
  <item><title>Acme faces lawsuit</title></item>
  <item><title>Acme launches store</title></item>
</channel></rss>"#;

// ---------------------------------------------------------------------------
// News
// ---------------------------------------------------------------------------

#[tokio::test]
async fn news_fetcher_counts_and_scores_articles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss/search"))
        .and(query_param("q", "acme us"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let fetcher = NewsFetcher::new(client(), &server.uri());
    let payload = fetcher.fetch("acme", "us").await.expect("news fetch");

    match payload {
        SourcePayload::News {
            sentiment,
            article_count,
            headlines,
        } => {
            assert_eq!(article_count, 3);
            assert_eq!(headlines[0], "Acme wins award");
            assert!(sentiment > 0.0, "award + great outweigh lawsuit: {sentiment}");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn news_fetcher_surfaces_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let fetcher = NewsFetcher::new(client(), &server.uri());
    let err = fetcher.fetch("acme", "us").await.unwrap_err();
    assert!(
        matches!(err, SourceError::UnexpectedStatus { status: 502, .. }),
        "got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// Social
// ---------------------------------------------------------------------------

#[tokio::test]
async fn social_fetcher_reads_reddit_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [
                    {"kind": "t3", "data": {"title": "Best support ever", "selftext": "", "score": 40, "num_comments": 10}},
                    {"kind": "t3", "data": {"title": "Tried acme", "selftext": "it was fine", "score": 2, "num_comments": 1}}
                ]
            }
        })))
        .mount(&server)
        .await;

    let fetcher = SocialFetcher::new(client(), &server.uri());
    let payload = fetcher.fetch("acme", "us").await.expect("social fetch");
    match payload {
        SourcePayload::SocialMedia {
            mention_count,
            engagement,
            ..
        } => {
            assert_eq!(mention_count, 2);
            assert_eq!(engagement, 53);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn social_fetcher_rejects_malformed_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
        .mount(&server)
        .await;

    let fetcher = SocialFetcher::new(client(), &server.uri());
    let err = fetcher.fetch("acme", "us").await.unwrap_err();
    assert!(matches!(err, SourceError::Deserialize { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Employer reviews
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reviews_fetcher_reads_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/companies/acme/reviews"))
        .and(query_param("area", "us"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rating": 4.2,
            "review_count": 310,
            "recommend_pct": 81.0
        })))
        .mount(&server)
        .await;

    let fetcher = ReviewsFetcher::new(client(), &server.uri());
    let payload = fetcher.fetch("acme", "us").await.expect("reviews fetch");
    assert_eq!(
        payload,
        SourcePayload::EmployerReviews {
            rating: 4.2,
            review_count: 310,
            recommend_pct: 81.0,
        }
    );
}

// ---------------------------------------------------------------------------
// Website
// ---------------------------------------------------------------------------

#[tokio::test]
async fn website_fetcher_checks_markup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>Acme</title><meta name="viewport" content="x"></head></html>"#,
        ))
        .mount(&server)
        .await;

    let template = format!("{}/{{subject}}", server.uri());
    let fetcher = WebsiteFetcher::new(client(), &template);
    let payload = fetcher.fetch("acme", "us").await.expect("website fetch");
    match payload {
        SourcePayload::WebsiteQuality {
            https,
            has_title,
            has_meta_description,
            has_viewport,
            page_bytes,
            ..
        } => {
            assert!(!https, "mock server is plain http");
            assert!(has_title);
            assert!(!has_meta_description);
            assert!(has_viewport);
            assert!(page_bytes > 0);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Collector around a real fetcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collector_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rating": 3.9,
            "review_count": 12
        })))
        .mount(&server)
        .await;

    let policy = CollectorPolicy {
        max_retries: 2,
        ..no_retry_policy()
    };
    let collector = SourceCollector::new(Arc::new(ReviewsFetcher::new(client(), &server.uri())), policy);
    let result = collector.collect("acme", "us").await;

    assert_eq!(result.status, SourceStatus::Ok);
    assert!(!result.used_fallback);
}

#[tokio::test]
async fn collector_falls_back_on_not_found_without_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let policy = CollectorPolicy {
        max_retries: 3,
        ..no_retry_policy()
    };
    let collector = SourceCollector::new(Arc::new(NewsFetcher::new(client(), &server.uri())), policy);
    let result = collector.collect("acme", "us").await;

    assert_eq!(result.status, SourceStatus::Degraded);
    assert!(result.used_fallback);
    assert_eq!(
        result.payload,
        Some(synthetic_payload(SourceKind::News, "acme", "us"))
    );
    assert!(result.error.as_deref().unwrap_or_default().contains("404"));
}

#[tokio::test]
async fn collector_reuses_last_good_payload_when_upstream_breaks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rating": 4.5,
            "review_count": 99,
            "recommend_pct": 90.0
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let collector = SourceCollector::new(
        Arc::new(ReviewsFetcher::new(client(), &server.uri())),
        no_retry_policy(),
    );
    let first = collector.collect("acme", "us").await;
    assert_eq!(first.status, SourceStatus::Ok);

    let second = collector.collect("acme", "us").await;
    assert_eq!(second.status, SourceStatus::Degraded);
    assert_eq!(second.payload, first.payload);
}

#[tokio::test]
async fn collector_rejects_malformed_subject() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let collector = SourceCollector::new(
        Arc::new(NewsFetcher::new(client(), &server.uri())),
        no_retry_policy(),
    );
    let result = collector.collect("", "us").await;
    assert_eq!(result.status, SourceStatus::Failed);
    assert!(result.payload.is_none());
}
