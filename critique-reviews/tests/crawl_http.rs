use std::sync::Arc;
use std::time::Duration;

use critique_http::HttpClient;
use critique_reviews::{HttpPageFetcher, ParseMode, ScrapeError, Scraper, StopReason};
use url::Url;
use wiremock::matchers::{header_exists, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_ONE: &str = include_str!("fixtures/listing_page1.html");
const TEXT_DATES: &str = include_str!("fixtures/listing_text_dates.html");
const EMPTY: &str = include_str!("fixtures/listing_empty.html");

fn scraper_for(server: &MockServer) -> Scraper {
    let client = HttpClient::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_secs(2))
        .with_retries(0);
    let fetcher = HttpPageFetcher::new(client, "critique-tests/0.1").unwrap();
    Scraper::new(
        Arc::new(fetcher),
        Url::parse(&server.uri()).unwrap(),
        "KiMi_",
        ParseMode::Permissive,
    )
    .unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

fn cards(titles: &[&str]) -> String {
    let body: String = titles
        .iter()
        .map(|t| format!(r#"<article data-testid="review-overview"><h2>{t}</h2></article>"#))
        .collect();
    format!("<html><body>{body}</body></html>")
}

#[tokio::test]
async fn newest_first_with_undated_last() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/KiMi_/critiques"))
        .and(query_param_is_missing("page"))
        .and(header_exists("accept-language"))
        .respond_with(html(PAGE_ONE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/KiMi_/critiques"))
        .and(query_param("page", "2"))
        .respond_with(html(EMPTY))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = scraper_for(&server)
        .scrape_reviews(10, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(snapshot.count(), 3);
    let titles: Vec<_> = snapshot.reviews().iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Premier Contact", "Dune", "The Wire"]);

    let first = &snapshot.reviews()[0];
    assert_eq!(first.rating, Some(9));
    assert_eq!(first.id.as_deref(), Some("300001"));
    assert_eq!(first.date_display.as_deref(), Some("il y a 1 jour"));
    assert_eq!(
        first.date_canonical.map(|d| snapshot.collected_at() - d),
        Some(chrono::TimeDelta::days(1))
    );
    assert_eq!(
        first.url.as_deref(),
        Some(format!("{}/film/premier_contact/critique/300001", server.uri()).as_str())
    );

    let dune = &snapshot.reviews()[1];
    assert_eq!(dune.date_display.as_deref(), Some("le 1 janv. 2024"));
    assert_eq!(dune.date_canonical.unwrap().to_string(), "2024-01-01 10:15:00");
    assert_eq!(dune.rating, None);

    let wire = &snapshot.reviews()[2];
    assert_eq!(wire.rating, Some(10));
    assert_eq!(wire.content, "Pas une ride.");
    assert_eq!(wire.date_canonical, None);
    assert_eq!(wire.image, None);
}

#[tokio::test]
async fn plain_text_dates_are_read_from_card_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/KiMi_/critiques"))
        .and(query_param_is_missing("page"))
        .respond_with(html(TEXT_DATES))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/KiMi_/critiques"))
        .and(query_param("page", "2"))
        .respond_with(html(EMPTY))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = scraper_for(&server)
        .scrape_reviews(10, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(snapshot.count(), 3);
    let titles: Vec<_> = snapshot.reviews().iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Premier Contact", "Dune", "The Wire"]);

    let dune = &snapshot.reviews()[1];
    assert_eq!(dune.date_display.as_deref(), Some("le 1 janv. 2024"));
    assert_eq!(dune.date_canonical.unwrap().to_string(), "2024-01-01 00:00:00");
    assert_eq!(dune.id.as_deref(), Some("400002"));

    assert_eq!(snapshot.reviews()[2].date_canonical, None);
}

#[tokio::test]
async fn failing_third_page_keeps_first_two() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/KiMi_/critiques"))
        .and(query_param_is_missing("page"))
        .respond_with(html(&cards(&["A", "B"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/KiMi_/critiques"))
        .and(query_param("page", "2"))
        .respond_with(html(&cards(&["C"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/KiMi_/critiques"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let scraper = scraper_for(&server);
    let report = scraper.crawl(10, Duration::ZERO).await;
    assert!(matches!(report.stop, StopReason::Aborted { page: 3, .. }));
    assert_eq!(report.pages_fetched, 2);

    let snapshot = scraper.scrape_reviews(10, Duration::ZERO).await.unwrap();
    let titles: Vec<_> = snapshot.reviews().iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["A", "B", "C"]);
}

#[tokio::test]
async fn unreachable_listing_is_a_first_page_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("membre introuvable"))
        .mount(&server)
        .await;

    let err = scraper_for(&server)
        .scrape_reviews(10, Duration::ZERO)
        .await
        .unwrap_err();
    match err {
        ScrapeError::FirstPage { reason } => assert!(reason.contains("404"), "{reason}"),
        other => panic!("unexpected error: {other:?}"),
    }
}
