//! Selector fallback chains for review listing markup.
//!
//! The listing markup changes without notice, so every field is looked up
//! through an ordered chain of [`Locator`]s. The first locator producing a
//! non-empty value wins; later ones are only consulted on a miss.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Path segments that identify a reviewed work.
pub const CONTENT_SEGMENTS: [&str; 4] = ["/film/", "/serie/", "/jeu/", "/livre/"];

const CONTENT_LIMIT: usize = 200;

static TITLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*critique\s+de\s+").expect("title prefix pattern"));
static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("integer pattern"));
static CRITIQUE_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| sel(r#"a[href*="/critique/"]"#));

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// A CSS selector paired with an extractor run on each match.
pub struct Locator {
    pub name: &'static str,
    selector: Selector,
    extract: fn(ElementRef<'_>) -> Option<String>,
}

impl Locator {
    pub fn new(name: &'static str, css: &str, extract: fn(ElementRef<'_>) -> Option<String>) -> Self {
        Self {
            name,
            selector: sel(css),
            extract,
        }
    }

    /// First non-empty extraction among this locator's matches.
    pub fn find(&self, fragment: ElementRef<'_>) -> Option<String> {
        self.find_refined(fragment, &|value| value)
    }

    /// Like [`find`](Self::find), but a value left empty by `refine` is a miss.
    pub fn find_refined(
        &self,
        fragment: ElementRef<'_>,
        refine: &dyn Fn(String) -> String,
    ) -> Option<String> {
        fragment.select(&self.selector).find_map(|el| {
            (self.extract)(el)
                .map(refine)
                .filter(|v| !v.trim().is_empty())
        })
    }
}

/// Run a chain left to right, returning the winning locator's name and value.
pub fn first_match(chain: &[Locator], fragment: ElementRef<'_>) -> Option<(&'static str, String)> {
    first_match_refined(chain, fragment, &|value| value)
}

pub fn first_match_refined(
    chain: &[Locator],
    fragment: ElementRef<'_>,
    refine: &dyn Fn(String) -> String,
) -> Option<(&'static str, String)> {
    chain
        .iter()
        .find_map(|loc| loc.find_refined(fragment, refine).map(|value| (loc.name, value)))
}

/// Trailing ` par <author>` signature the listing appends to headings.
#[derive(Debug, Clone)]
pub struct Byline(Regex);

impl Byline {
    pub fn new(author: &str) -> Result<Self, regex::Error> {
        let pattern = format!(r"(?i)(?:^|\s+)par\s+{}\s*$", regex::escape(author.trim()));
        Regex::new(&pattern).map(Self)
    }

    pub fn strip(&self, title: &str) -> String {
        self.0.replace(title.trim(), "").trim().to_string()
    }
}

pub static TITLE: LazyLock<Vec<Locator>> = LazyLock::new(|| {
    vec![
        Locator::new("title.product", r#"a[data-testid="productReviewTitle"]"#, title_text),
        Locator::new("title.review_heading", r#"h2[data-testid="reviewTitle"] a"#, title_text),
        Locator::new("title.h2", "h2", title_text),
        Locator::new("title.h3", "h3", title_text),
    ]
});

/// Extra title locators tried only in permissive mode.
pub static TITLE_PERMISSIVE: LazyLock<Vec<Locator>> = LazyLock::new(|| {
    vec![Locator::new("title.work_anchor", "a[href]", |el| {
        let href = el.value().attr("href")?;
        is_work_path(href).then(|| title_text(el)).flatten()
    })]
});

pub static CONTENT: LazyLock<Vec<Locator>> = LazyLock::new(|| {
    vec![
        Locator::new("content.linkify", r#"[data-testid="linkify"]"#, text),
        Locator::new(
            "content.class_hint",
            r#"p[class*="content"], p[class*="Content"]"#,
            text,
        ),
        Locator::new("content.paragraph", "p", text),
    ]
});

pub static RATING: LazyLock<Vec<Locator>> = LazyLock::new(|| {
    vec![
        Locator::new("rating.testid", r#"[data-testid="Rating"]"#, integer_text),
        Locator::new(
            "rating.class_hint",
            r#"[class*="rating"], [class*="Rating"]"#,
            integer_text,
        ),
    ]
});

pub static LINK: LazyLock<Vec<Locator>> = LazyLock::new(|| {
    vec![
        Locator::new("link.product", r#"a[data-testid="productReviewTitle"][href]"#, href),
        Locator::new("link.review_heading", r#"h2[data-testid="reviewTitle"] a[href]"#, href),
        Locator::new("link.work_anchor", "a[href]", |el| {
            let href = el.value().attr("href")?;
            (is_work_path(href) || href.contains("/critique/")).then(|| href.trim().to_string())
        }),
    ]
});

/// A selector that identifies review cards in a whole page.
pub struct CardLocator {
    pub name: &'static str,
    selector: Selector,
    accept: fn(ElementRef<'_>) -> bool,
}

impl CardLocator {
    fn new(name: &'static str, css: &str, accept: fn(ElementRef<'_>) -> bool) -> Self {
        Self {
            name,
            selector: sel(css),
            accept,
        }
    }
}

pub static CARDS: LazyLock<Vec<CardLocator>> = LazyLock::new(|| {
    vec![
        CardLocator::new("cards.review_overview", r#"article[data-testid="review-overview"]"#, |_| true),
        CardLocator::new("cards.testid_hint", r#"article[data-testid*="review"]"#, |_| true),
        CardLocator::new(
            "cards.class_hint",
            r#".review-card, [class*="ReviewCard"]"#,
            |_| true,
        ),
        CardLocator::new("cards.article_with_review_link", "article", |el| {
            el.select(&CRITIQUE_ANCHOR).next().is_some()
        }),
    ]
});

/// Review cards of a page, from the first card locator that matches any.
pub fn find_cards(document: &Html) -> Option<(&'static str, Vec<ElementRef<'_>>)> {
    CARDS.iter().find_map(|loc| {
        let cards: Vec<_> = document
            .select(&loc.selector)
            .filter(|el| (loc.accept)(*el))
            .collect();
        (!cards.is_empty()).then_some((loc.name, cards))
    })
}

/// All descendant text, whitespace collapsed to single spaces.
pub fn collapse_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip a leading `Critique de ` from a heading. The author byline is
/// handled by [`Byline`], which knows whose signature to remove.
pub fn clean_title(raw: &str) -> String {
    TITLE_PREFIX.replace(raw.trim(), "").trim().to_string()
}

/// Cap review bodies at 200 characters, marking the cut with `...`.
pub fn truncate_content(raw: &str) -> String {
    match raw.char_indices().nth(CONTENT_LIMIT) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}

pub fn first_integer(raw: &str) -> Option<u32> {
    INTEGER.find(raw)?.as_str().parse().ok()
}

pub fn is_work_path(href: &str) -> bool {
    CONTENT_SEGMENTS.iter().any(|seg| href.contains(seg))
}

fn text(el: ElementRef<'_>) -> Option<String> {
    Some(collapse_text(el))
}

fn title_text(el: ElementRef<'_>) -> Option<String> {
    Some(clean_title(&collapse_text(el)))
}

fn integer_text(el: ElementRef<'_>) -> Option<String> {
    first_integer(&collapse_text(el)).map(|n| n.to_string())
}

fn href(el: ElementRef<'_>) -> Option<String> {
    el.value().attr("href").map(|h| h.trim().to_string())
}
