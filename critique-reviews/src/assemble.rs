use std::cmp::Reverse;

use chrono::NaiveDateTime;

use crate::types::{Review, Snapshot};

/// Wrap crawled reviews into a [`Snapshot`], newest first.
///
/// The sort is stable: undated reviews go last and keep their crawl order,
/// as do reviews sharing a timestamp.
pub fn assemble(
    source_identity: impl Into<String>,
    mut reviews: Vec<Review>,
    collected_at: NaiveDateTime,
) -> Snapshot {
    reviews.sort_by_key(|r| (r.date_canonical.is_none(), r.date_canonical.map(Reverse)));
    Snapshot::from_sorted(source_identity.into(), collected_at, reviews)
}
