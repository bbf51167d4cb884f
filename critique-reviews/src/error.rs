use thiserror::Error;

/// Failures that leave the caller without any snapshot.
///
/// Anything that goes wrong after the first page only shortens the crawl.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("first listing page could not be fetched: {reason}")]
    FirstPage { reason: String },
    #[error("invalid listing location: {0}")]
    InvalidListing(String),
}
