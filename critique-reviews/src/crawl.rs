//! Page-by-page crawl of a member's review listing.
//!
//! The crawl walks pages `1..=max_pages` strictly in sequence and stops at
//! the first page that has no review cards, adds no new titles, or cannot be
//! fetched. A failed fetch never discards what earlier pages produced.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::assemble::assemble;
use crate::element::{ParseMode, ReviewParser};
use crate::error::ScrapeError;
use crate::fetch::PageFetcher;
use crate::locate::find_cards;
use crate::types::{Review, Snapshot};

/// One page of the listing to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub url: Url,
}

/// `<origin>/<username>/critiques`, with `?page=N` past the first page.
#[derive(Debug, Clone)]
pub struct ListingUrl {
    base: Url,
}

impl ListingUrl {
    pub fn new(origin: &Url, username: &str) -> Result<Self, ScrapeError> {
        let username = username.trim();
        if username.is_empty() || username.contains(['/', '?', '#']) {
            return Err(ScrapeError::InvalidListing(format!(
                "unusable username {username:?}"
            )));
        }
        let base = origin
            .join(&format!("{username}/critiques"))
            .map_err(|e| ScrapeError::InvalidListing(e.to_string()))?;
        Ok(Self { base })
    }

    pub fn page_url(&self, page: u32) -> Url {
        let mut url = self.base.clone();
        if page > 1 {
            url.set_query(Some(&format!("page={page}")));
        }
        url
    }

    pub fn request(&self, page: u32) -> PageRequest {
        PageRequest {
            number: page,
            url: self.page_url(page),
        }
    }
}

/// Why a crawl ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The page had no review cards at all.
    EmptyPage { page: u32 },
    /// Every card on the page repeated a title already collected.
    NoNewReviews { page: u32 },
    /// `max_pages` pages were consumed.
    PageLimit,
    /// Fetching `page` failed; earlier pages are kept.
    Aborted { page: u32, reason: String },
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Unique by title, in page order.
    pub reviews: Vec<Review>,
    pub stop: StopReason,
    pub pages_fetched: u32,
}

enum CrawlState {
    Fetching { page: u32 },
    /// Locating cards and extracting fields from a fetched page.
    Extracting { page: u32, html: String },
    Finished(StopReason),
}

/// Crawls one member's listing and assembles the result.
///
/// Cheap to clone; clones share the fetcher.
#[derive(Clone)]
pub struct Scraper {
    fetcher: Arc<dyn PageFetcher>,
    parser: ReviewParser,
    listing: ListingUrl,
    source_identity: String,
}

impl Scraper {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        origin: Url,
        username: &str,
        mode: ParseMode,
    ) -> Result<Self, ScrapeError> {
        let listing = ListingUrl::new(&origin, username)?;
        let parser = ReviewParser::new(origin, username.trim(), mode)
            .map_err(|e| ScrapeError::InvalidListing(e.to_string()))?;
        Ok(Self {
            fetcher,
            parser,
            listing,
            source_identity: username.trim().to_string(),
        })
    }

    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }

    pub fn listing(&self) -> &ListingUrl {
        &self.listing
    }

    /// Crawl and assemble a snapshot stamped with the current local time.
    ///
    /// Only a failure on the first page is an error.
    pub async fn scrape_reviews(
        &self,
        max_pages: u32,
        delay: Duration,
    ) -> Result<Snapshot, ScrapeError> {
        let now = local_now();
        let report = self.crawl_at(max_pages, delay, now).await;
        if let StopReason::Aborted { page: 1, reason } = report.stop {
            return Err(ScrapeError::FirstPage { reason });
        }
        Ok(assemble(self.source_identity.clone(), report.reviews, now))
    }

    pub async fn crawl(&self, max_pages: u32, delay: Duration) -> CrawlReport {
        self.crawl_at(max_pages, delay, local_now()).await
    }

    /// Crawl with relative dates resolved against `now`.
    pub async fn crawl_at(&self, max_pages: u32, delay: Duration, now: NaiveDateTime) -> CrawlReport {
        let mut reviews: Vec<Review> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages_fetched = 0;

        let mut state = if max_pages == 0 {
            CrawlState::Finished(StopReason::PageLimit)
        } else {
            CrawlState::Fetching { page: 1 }
        };

        loop {
            state = match state {
                CrawlState::Fetching { page } => {
                    let request = self.listing.request(page);
                    match self.fetcher.fetch(&request).await {
                        Ok(html) => {
                            pages_fetched += 1;
                            debug!(target: "reviews.crawl", page, bytes = html.len(), "crawl.page.fetched");
                            CrawlState::Extracting { page, html }
                        }
                        Err(err) => {
                            warn!(
                                target: "reviews.crawl",
                                page,
                                url = %request.url,
                                error = %err,
                                kept = reviews.len(),
                                "crawl.aborted"
                            );
                            CrawlState::Finished(StopReason::Aborted {
                                page,
                                reason: err.to_string(),
                            })
                        }
                    }
                }
                CrawlState::Extracting { page, html } => {
                    match extract_page(&self.parser, &html, now) {
                        None => CrawlState::Finished(StopReason::EmptyPage { page }),
                        Some(found) => {
                            let before = reviews.len();
                            for review in found {
                                if seen.insert(review.title.clone()) {
                                    reviews.push(review);
                                }
                            }
                            let added = reviews.len() - before;
                            debug!(target: "reviews.crawl", page, added, total = reviews.len(), "crawl.page.extracted");

                            if added == 0 {
                                CrawlState::Finished(StopReason::NoNewReviews { page })
                            } else if page >= max_pages {
                                CrawlState::Finished(StopReason::PageLimit)
                            } else {
                                tokio::time::sleep(delay).await;
                                CrawlState::Fetching { page: page + 1 }
                            }
                        }
                    }
                }
                CrawlState::Finished(stop) => {
                    info!(
                        target: "reviews.crawl",
                        source = %self.source_identity,
                        pages = pages_fetched,
                        reviews = reviews.len(),
                        stop = ?stop,
                        "crawl.finished"
                    );
                    return CrawlReport {
                        reviews,
                        stop,
                        pages_fetched,
                    };
                }
            };
        }
    }
}

/// Parse one listing page. `None` when the page has no review cards.
///
/// Kept synchronous: the parsed document must not live across an await.
pub fn extract_page(parser: &ReviewParser, html: &str, now: NaiveDateTime) -> Option<Vec<Review>> {
    let document = Html::parse_document(html);
    let (locator, cards) = find_cards(&document)?;
    debug!(target: "reviews.crawl", locator, cards = cards.len(), "crawl.cards.located");
    Some(
        cards
            .into_iter()
            .filter_map(|card| parser.parse(card, now))
            .collect(),
    )
}

fn local_now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages; pages without an entry fail.
    #[derive(Default)]
    struct CannedPages {
        pages: HashMap<u32, String>,
        requested: Mutex<Vec<PageRequest>>,
    }

    impl CannedPages {
        fn with(mut self, page: u32, html: String) -> Self {
            self.pages.insert(page, html);
            self
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().iter().map(|r| r.number).collect()
        }
    }

    #[async_trait]
    impl PageFetcher for CannedPages {
        async fn fetch(&self, request: &PageRequest) -> Result<String, FetchError> {
            self.requested.lock().unwrap().push(request.clone());
            self.pages
                .get(&request.number)
                .cloned()
                .ok_or_else(|| FetchError::Unavailable(format!("no page {}", request.number)))
        }
    }

    fn page(titles: &[&str]) -> String {
        let cards: String = titles
            .iter()
            .map(|t| format!(r#"<article data-testid="review-overview"><h2>{t}</h2></article>"#))
            .collect();
        format!("<html><body>{cards}</body></html>")
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 10).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn scraper(fetcher: Arc<CannedPages>) -> Scraper {
        Scraper::new(
            fetcher,
            Url::parse("https://www.senscritique.com").unwrap(),
            "KiMi_",
            ParseMode::Permissive,
        )
        .unwrap()
    }

    #[test]
    fn listing_urls() {
        let origin = Url::parse("https://www.senscritique.com").unwrap();
        let listing = ListingUrl::new(&origin, "KiMi_").unwrap();
        assert_eq!(listing.page_url(1).as_str(), "https://www.senscritique.com/KiMi_/critiques");
        assert_eq!(
            listing.page_url(3).as_str(),
            "https://www.senscritique.com/KiMi_/critiques?page=3"
        );
        assert!(ListingUrl::new(&origin, "  ").is_err());
        assert!(ListingUrl::new(&origin, "a/b").is_err());
    }

    #[tokio::test]
    async fn stops_at_empty_page() {
        let fetcher = Arc::new(
            CannedPages::default()
                .with(1, page(&["A", "B"]))
                .with(2, page(&["C"]))
                .with(3, "<html><body><p>Rien</p></body></html>".into()),
        );
        let report = scraper(fetcher.clone()).crawl_at(10, Duration::ZERO, now()).await;

        assert_eq!(report.stop, StopReason::EmptyPage { page: 3 });
        assert_eq!(report.pages_fetched, 3);
        let titles: Vec<_> = report.reviews.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(fetcher.requested(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn repeated_page_ends_crawl_and_duplicates_keep_first() {
        let mut first = page(&["A", "B"]);
        first = first.replace(
            "</body>",
            r#"<article data-testid="review-overview"><h2>A</h2><p>second copy</p></article></body>"#,
        );
        let fetcher = Arc::new(
            CannedPages::default()
                .with(1, first)
                .with(2, page(&["A", "B"])),
        );
        let report = scraper(fetcher.clone()).crawl_at(10, Duration::ZERO, now()).await;

        assert_eq!(report.stop, StopReason::NoNewReviews { page: 2 });
        assert_eq!(report.reviews.len(), 2);
        assert_eq!(report.reviews[0].content, crate::types::NO_CONTENT);
        assert_eq!(fetcher.requested(), [1, 2]);
    }

    #[tokio::test]
    async fn page_limit_is_respected() {
        let fetcher = Arc::new(
            CannedPages::default()
                .with(1, page(&["A"]))
                .with(2, page(&["B"]))
                .with(3, page(&["C"])),
        );
        let report = scraper(fetcher.clone()).crawl_at(2, Duration::ZERO, now()).await;

        assert_eq!(report.stop, StopReason::PageLimit);
        assert_eq!(report.reviews.len(), 2);
        assert_eq!(fetcher.requested(), [1, 2]);
    }

    #[tokio::test]
    async fn zero_page_budget_fetches_nothing() {
        let fetcher = Arc::new(CannedPages::default());
        let report = scraper(fetcher.clone()).crawl_at(0, Duration::ZERO, now()).await;
        assert_eq!(report.stop, StopReason::PageLimit);
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn failure_mid_crawl_keeps_earlier_pages() {
        let fetcher = Arc::new(
            CannedPages::default()
                .with(1, page(&["A"]))
                .with(2, page(&["B"])),
        );
        let s = scraper(fetcher.clone());
        let report = s.crawl_at(10, Duration::ZERO, now()).await;
        assert!(matches!(report.stop, StopReason::Aborted { page: 3, .. }));
        assert_eq!(report.reviews.len(), 2);

        let snapshot = s.scrape_reviews(10, Duration::ZERO).await.unwrap();
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.source_identity(), "KiMi_");
    }

    #[tokio::test]
    async fn first_page_failure_is_an_error() {
        let fetcher = Arc::new(CannedPages::default());
        let err = scraper(fetcher).scrape_reviews(10, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ScrapeError::FirstPage { .. }));
    }

    #[tokio::test]
    async fn pauses_between_pages_but_not_after_the_last() {
        let fetcher = Arc::new(
            CannedPages::default()
                .with(1, page(&["A"]))
                .with(2, page(&["B"]))
                .with(3, page(&["C"])),
        );
        let started = std::time::Instant::now();
        let report = scraper(fetcher)
            .crawl_at(3, Duration::from_millis(25), now())
            .await;
        assert_eq!(report.stop, StopReason::PageLimit);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn cards_without_titles_yield_an_empty_list() {
        let parser = ReviewParser::new(
            Url::parse("https://www.senscritique.com").unwrap(),
            "KiMi_",
            ParseMode::Strict,
        )
        .unwrap();
        let html = r#"<article data-testid="review-overview"><p>no title</p></article>"#;
        assert_eq!(extract_page(&parser, html, now()), Some(Vec::new()));
        assert_eq!(extract_page(&parser, "<p>nothing</p>", now()), None);
    }
}
