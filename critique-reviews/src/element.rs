//! Field extraction for a single review card.
//!
//! Each field goes through its locator chain in [`crate::locate`]. Only the
//! title is mandatory; a card without one is dropped.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::trace;
use url::Url;

use crate::date::{normalize, signals_from_fragment};
use crate::locate::{
    first_integer, first_match, first_match_refined, truncate_content, Byline, CONTENT, LINK,
    RATING, TITLE, TITLE_PERMISSIVE,
};
use crate::types::{Review, NO_CONTENT};

static REVIEW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/critique/(\d+)").expect("review id pattern"));
static IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("image selector"));

/// How far title lookup may reach when the usual markup is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Headings and dedicated title anchors only.
    Strict,
    /// Also accept any link to a film, series, game or book page.
    #[default]
    Permissive,
}

/// Turns one review card into a [`Review`].
#[derive(Debug, Clone)]
pub struct ReviewParser {
    origin: Url,
    byline: Byline,
    mode: ParseMode,
}

impl ReviewParser {
    /// `author` is the listing owner, whose ` par <author>` signature is
    /// removed from titles.
    pub fn new(origin: Url, author: &str, mode: ParseMode) -> Result<Self, regex::Error> {
        Ok(Self {
            origin,
            byline: Byline::new(author)?,
            mode,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// `None` when no title can be found; every other field is best effort.
    pub fn parse(&self, fragment: ElementRef<'_>, now: NaiveDateTime) -> Option<Review> {
        let strip = |title: String| self.byline.strip(&title);
        let found = first_match_refined(&TITLE, fragment, &strip).or_else(|| match self.mode {
            ParseMode::Permissive => first_match_refined(&TITLE_PERMISSIVE, fragment, &strip),
            ParseMode::Strict => None,
        });
        let Some((_, title)) = found else {
            trace!(target: "reviews.element", mode = ?self.mode, "card.skipped.no_title");
            return None;
        };

        let content = first_match(&CONTENT, fragment)
            .map(|(_, body)| truncate_content(&body))
            .unwrap_or_else(|| NO_CONTENT.to_string());

        let rating = first_match(&RATING, fragment).and_then(|(_, raw)| first_integer(&raw));

        let url = first_match(&LINK, fragment).and_then(|(name, href)| {
            let resolved = self.absolutize(&href);
            if resolved.is_none() {
                trace!(target: "reviews.element", locator = name, href = %href, "link.unresolvable");
            }
            resolved
        });
        let id = url.as_deref().and_then(review_id);

        let date = normalize(&signals_from_fragment(fragment), now);

        Some(Review {
            title,
            content,
            rating,
            url,
            id,
            date_canonical: date.canonical,
            date_display: date.display,
            image: self.image(fragment),
        })
    }

    fn absolutize(&self, href: &str) -> Option<String> {
        self.origin.join(href).ok().map(String::from)
    }

    /// Poster URL, only for images served from the site's own domain.
    fn image(&self, fragment: ElementRef<'_>) -> Option<String> {
        let host = self.origin.host_str()?;
        let site = host.strip_prefix("www.").unwrap_or(host);
        fragment
            .select(&IMAGE)
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .find(|src| src.contains(site))
            .and_then(|src| self.absolutize(src))
    }
}

/// Numeric id from a `/critique/<digits>` path segment.
pub fn review_id(url: &str) -> Option<String> {
    REVIEW_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};
    use scraper::Html;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 10).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    fn parser(mode: ParseMode) -> ReviewParser {
        ReviewParser::new(Url::parse("https://www.senscritique.com").unwrap(), "KiMi_", mode).unwrap()
    }

    fn parse(html: &str, mode: ParseMode) -> Option<Review> {
        let doc = Html::parse_fragment(html);
        parser(mode).parse(doc.root_element(), now())
    }

    #[test]
    fn full_card() {
        let review = parse(
            r#"<article data-testid="review-overview">
                <img src="https://media.senscritique.com/media/000/dune.jpg">
                <a data-testid="productReviewTitle" href="/film/dune/critique/301234">Critique de Dune par KiMi_</a>
                <div data-testid="Rating">8</div>
                <p data-testid="linkify">  Un   grand film.  </p>
                <time datetime="2025-11-04T09:30:00.000Z">le 4 nov. 2025</time>
            </article>"#,
            ParseMode::Strict,
        )
        .unwrap();

        assert_eq!(review.title, "Dune");
        assert_eq!(review.content, "Un grand film.");
        assert_eq!(review.rating, Some(8));
        assert_eq!(
            review.url.as_deref(),
            Some("https://www.senscritique.com/film/dune/critique/301234")
        );
        assert_eq!(review.id.as_deref(), Some("301234"));
        assert_eq!(review.date_display.as_deref(), Some("le 4 nov. 2025"));
        assert_eq!(
            review.date_canonical,
            Some(NaiveDate::from_ymd_opt(2025, 11, 4).unwrap().and_hms_opt(9, 30, 0).unwrap())
        );
        assert_eq!(
            review.image.as_deref(),
            Some("https://media.senscritique.com/media/000/dune.jpg")
        );
    }

    #[test]
    fn sparse_card_gets_defaults() {
        let review = parse("<article><h3>Heat</h3></article>", ParseMode::Strict).unwrap();
        assert_eq!(review.title, "Heat");
        assert_eq!(review.content, NO_CONTENT);
        assert_eq!(review.rating, None);
        assert_eq!(review.url, None);
        assert_eq!(review.id, None);
        assert_eq!(review.date_canonical, None);
        assert_eq!(review.date_display, None);
        assert_eq!(review.image, None);
    }

    #[test]
    fn only_the_owner_byline_is_stripped() {
        let review = parse(
            r#"<article><a data-testid="productReviewTitle" href="/film/tue/critique/5">Tué par balle</a></article>"#,
            ParseMode::Strict,
        )
        .unwrap();
        assert_eq!(review.title, "Tué par balle");

        let review = parse("<article><h2>Critique de Heat par kimi_</h2></article>", ParseMode::Strict).unwrap();
        assert_eq!(review.title, "Heat");
    }

    #[test]
    fn no_title_drops_the_card() {
        assert!(parse("<article><p>Orphan text</p></article>", ParseMode::Permissive).is_none());
    }

    #[test]
    fn mode_controls_work_anchor_titles() {
        let html = r#"<article><a href="/livre/dune/1234">Dune</a><span>il y a 3 jours</span></article>"#;
        assert!(parse(html, ParseMode::Strict).is_none());

        let review = parse(html, ParseMode::Permissive).unwrap();
        assert_eq!(review.title, "Dune");
        assert_eq!(review.url.as_deref(), Some("https://www.senscritique.com/livre/dune/1234"));
        assert_eq!(review.id, None);
        assert_eq!(review.date_canonical, Some(now() - TimeDelta::days(3)));
        assert_eq!(review.date_display.as_deref(), Some("il y a 3 jours"));
    }

    #[test]
    fn long_content_is_truncated() {
        let body = "a".repeat(250);
        let review = parse(&format!("<article><h2>Long</h2><p>{body}</p></article>"), ParseMode::Strict).unwrap();
        assert_eq!(review.content, format!("{}...", "a".repeat(200)));
    }

    #[test]
    fn foreign_images_are_ignored() {
        let review = parse(
            r#"<article><h2>X</h2><img src="https://cdn.example.org/x.jpg"></article>"#,
            ParseMode::Strict,
        )
        .unwrap();
        assert_eq!(review.image, None);
    }

    #[test]
    fn review_id_needs_digits() {
        assert_eq!(review_id("/film/x/critique/77").as_deref(), Some("77"));
        assert_eq!(review_id("/film/x/critique/abc"), None);
    }
}
