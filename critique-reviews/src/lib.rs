//! SensCritique review listing scraper.
//!
//! A [`Scraper`] walks a member's `/critiques` pages through a
//! [`PageFetcher`], turns each review card into a [`Review`] and assembles
//! the lot into a [`Snapshot`], newest first. [`SnapshotStore`] persists the
//! result as the JSON document downstream consumers read.
//!
//! Field lookup lives in [`locate`] and [`element`]; French date handling in
//! [`date`].
pub mod assemble;
pub mod crawl;
pub mod date;
pub mod element;
pub mod error;
pub mod fetch;
pub mod locate;
pub mod store;
pub mod types;

pub use assemble::assemble;
pub use crawl::{CrawlReport, ListingUrl, PageRequest, Scraper, StopReason};
pub use date::{normalize, DateSignal, NormalizedDate};
pub use element::{ParseMode, ReviewParser};
pub use error::ScrapeError;
pub use fetch::{FetchError, HttpPageFetcher, PageFetcher};
pub use store::{JsonFileStore, SnapshotStore, StoreError};
pub use types::{Review, Snapshot, NO_CONTENT};
