use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::assemble::assemble;
use crate::date::parse_timestamp;

/// Stored in place of an empty review body.
pub const NO_CONTENT: &str = "Pas de commentaire";

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One review card, as extracted from a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ReviewRecord", from = "ReviewRecord")]
pub struct Review {
    pub title: String,
    pub content: String,
    pub rating: Option<u32>,
    pub url: Option<String>,
    pub id: Option<String>,
    pub date_canonical: Option<NaiveDateTime>,
    pub date_display: Option<String>,
    pub image: Option<String>,
}

/// Wire shape of a review. `date` and `date_raw` both carry the display text.
#[derive(Serialize, Deserialize)]
struct ReviewRecord {
    title: String,
    #[serde(default = "default_content")]
    content: String,
    #[serde(default, deserialize_with = "lenient_rating")]
    rating: Option<u32>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    date_raw: Option<String>,
    #[serde(default, with = "iso_opt")]
    date_iso: Option<NaiveDateTime>,
    #[serde(default)]
    image: Option<String>,
}

fn default_content() -> String {
    NO_CONTENT.to_string()
}

impl From<Review> for ReviewRecord {
    fn from(r: Review) -> Self {
        Self {
            title: r.title,
            content: r.content,
            rating: r.rating,
            url: r.url,
            id: r.id,
            date: r.date_display.clone(),
            date_raw: r.date_display,
            date_iso: r.date_canonical,
            image: r.image,
        }
    }
}

impl From<ReviewRecord> for Review {
    fn from(r: ReviewRecord) -> Self {
        // Files written before `date_iso` existed kept the ISO day in `date`
        // and the listing text in `date_raw`.
        let date_canonical = r
            .date_iso
            .or_else(|| r.date.as_deref().and_then(parse_timestamp))
            .or_else(|| r.date_raw.as_deref().and_then(parse_timestamp));
        let date_display = r.date_raw.or(r.date);
        Self {
            title: r.title,
            content: r.content,
            rating: r.rating,
            url: r.url,
            id: r.id,
            date_canonical,
            date_display,
            image: r.image,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RatingRepr {
    Int(u32),
    Text(String),
}

fn lenient_rating<'de, D>(de: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<RatingRepr>::deserialize(de)?;
    Ok(match repr {
        Some(RatingRepr::Int(n)) => Some(n),
        Some(RatingRepr::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// `%Y-%m-%dT%H:%M:%S` on the way out; anything [`parse_timestamp`] accepts on
/// the way in, unparseable values become `None`.
mod iso_opt {
    use super::*;

    pub fn serialize<S>(value: &Option<NaiveDateTime>, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => ser.serialize_str(&ts.format(ISO_FORMAT).to_string()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(de: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(de)?;
        Ok(raw.as_deref().and_then(parse_timestamp))
    }
}

/// A completed crawl: whose reviews, when, and the reviews newest first.
///
/// Built by [`assemble`]; the review count is always derived from the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SnapshotRecord", try_from = "SnapshotRecord")]
pub struct Snapshot {
    source_identity: String,
    collected_at: NaiveDateTime,
    reviews: Vec<Review>,
}

impl Snapshot {
    /// Callers go through [`assemble`], which establishes the ordering.
    pub(crate) fn from_sorted(
        source_identity: String,
        collected_at: NaiveDateTime,
        reviews: Vec<Review>,
    ) -> Self {
        Self {
            source_identity,
            collected_at,
            reviews,
        }
    }

    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }

    pub fn collected_at(&self) -> NaiveDateTime {
        self.collected_at
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn count(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    username: String,
    #[serde(with = "iso_opt")]
    updated_at: Option<NaiveDateTime>,
    /// Written for consumers, ignored when reading.
    #[serde(default)]
    total_reviews: usize,
    #[serde(default)]
    reviews: Vec<Review>,
}

impl From<Snapshot> for SnapshotRecord {
    fn from(s: Snapshot) -> Self {
        Self {
            username: s.source_identity,
            updated_at: Some(s.collected_at),
            total_reviews: s.reviews.len(),
            reviews: s.reviews,
        }
    }
}

impl TryFrom<SnapshotRecord> for Snapshot {
    type Error = String;

    fn try_from(r: SnapshotRecord) -> Result<Self, Self::Error> {
        let collected_at = r
            .updated_at
            .ok_or_else(|| "snapshot has no valid updated_at".to_string())?;
        Ok(assemble(r.username, r.reviews, collected_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn review(title: &str, date: Option<NaiveDateTime>) -> Review {
        Review {
            title: title.into(),
            content: NO_CONTENT.into(),
            rating: None,
            url: None,
            id: None,
            date_canonical: date,
            date_display: None,
            image: None,
        }
    }

    #[test]
    fn review_serializes_display_twice_and_iso_once() {
        let mut r = review("Dune", Some(at(2025, 11, 4)));
        r.date_display = Some("le 4 nov. 2025".into());
        r.rating = Some(8);

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["date"], "le 4 nov. 2025");
        assert_eq!(v["date_raw"], "le 4 nov. 2025");
        assert_eq!(v["date_iso"], "2025-11-04T00:00:00");
        assert_eq!(v["rating"], 8);
        assert_eq!(v["url"], serde_json::Value::Null);
    }

    #[test]
    fn review_loads_legacy_shapes() {
        let r: Review = serde_json::from_value(json!({
            "title": "Alien",
            "rating": "7",
            "date": "hier",
            "date_iso": "2024-05-01"
        }))
        .unwrap();
        assert_eq!(r.rating, Some(7));
        assert_eq!(r.content, NO_CONTENT);
        assert_eq!(r.date_display.as_deref(), Some("hier"));
        assert_eq!(r.date_canonical, Some(at(2024, 5, 1)));

        let r: Review = serde_json::from_value(json!({
            "title": "Alien",
            "rating": "n/a",
            "date_iso": "not a date"
        }))
        .unwrap();
        assert_eq!(r.rating, None);
        assert_eq!(r.date_canonical, None);

        let r: Review = serde_json::from_value(json!({
            "title": "Alien",
            "date": "2025-11-01",
            "date_raw": "il y a 9 jours"
        }))
        .unwrap();
        assert_eq!(r.date_display.as_deref(), Some("il y a 9 jours"));
        assert_eq!(r.date_canonical, Some(at(2025, 11, 1)));

        let out = serde_json::to_value(&r).unwrap();
        assert_eq!(out["date_iso"], "2025-11-01T00:00:00");
    }

    #[test]
    fn snapshot_count_is_recomputed_and_order_restored() {
        let snap: Snapshot = serde_json::from_value(json!({
            "username": "KiMi_",
            "updated_at": "2025-11-04T10:00:00.123456",
            "total_reviews": 99,
            "reviews": [
                { "title": "old", "date_iso": "2020-01-01T00:00:00" },
                { "title": "undated" },
                { "title": "new", "date_iso": "2025-01-01T00:00:00" }
            ]
        }))
        .unwrap();

        assert_eq!(snap.count(), 3);
        let titles: Vec<_> = snap.reviews().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["new", "old", "undated"]);
        assert_eq!(snap.collected_at(), at(2025, 11, 4) + chrono::TimeDelta::hours(10));

        let out = serde_json::to_value(&snap).unwrap();
        assert_eq!(out["total_reviews"], 3);
        assert_eq!(out["updated_at"], "2025-11-04T10:00:00");
        assert_eq!(out["username"], "KiMi_");
    }

    #[test]
    fn snapshot_without_timestamp_is_rejected() {
        let err = serde_json::from_value::<Snapshot>(json!({
            "username": "KiMi_",
            "updated_at": null,
            "reviews": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("updated_at"));
    }
}
