//! Date normalization for review cards.
//!
//! A card can carry its date three ways, and they disagree often enough that
//! the order matters:
//!
//! 1. [`DateSignal::Attribute`]: the `datetime` attribute of a `<time>` element
//!    (`2024-03-02T18:45:12.000Z`). Always wins when it parses.
//! 2. [`DateSignal::Absolute`]: a French calendar date (`le 4 nov. 2025`).
//! 3. [`DateSignal::Relative`]: a French relative phrase (`il y a 3 semaines`),
//!    resolved against an injected `now` with 1 month = 30 days and
//!    1 year = 365 days.
//!
//! [`normalize`] is the only place that knows this priority.
//!
//! ```
//! use chrono::NaiveDate;
//! use critique_reviews::date::{normalize, DateSignal};
//!
//! let now = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
//! let resolved = normalize(
//!     &[
//!         DateSignal::Relative("il y a 2 jours".into()),
//!         DateSignal::Attribute {
//!             stamp: "2025-11-04T09:30:00.000Z".into(),
//!             display: Some("le 4 nov. 2025".into()),
//!         },
//!     ],
//!     now,
//! );
//! assert_eq!(resolved.canonical.unwrap().to_string(), "2025-11-04 09:30:00");
//! assert_eq!(resolved.display.as_deref(), Some("le 4 nov. 2025"));
//! ```

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use regex::{Captures, Regex};
use scraper::{ElementRef, Selector};

use crate::locate::collapse_text;

static STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2}))?)?")
        .expect("timestamp pattern")
});

static ABSOLUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\ble\s+)?\b(\d{1,2})(?:er)?\s+(\p{L}+)\.?\s+(\d{4})\b")
        .expect("absolute date pattern")
});

static RELATIVE_AGO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bil\s+y\s+a\s+(\d+)\s+(jours?|semaines?|mois|ann[ée]es?|ans?)\b")
        .expect("relative date pattern")
});

static RELATIVE_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(hier|aujourd['’]hui)\b").expect("relative word pattern")
});

static TIME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time").expect("time selector"));

/// One way a card expresses its date. See the module docs for priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSignal {
    /// Machine-readable stamp plus the `<time>` element's own text, if any.
    Attribute {
        stamp: String,
        display: Option<String>,
    },
    /// Text that may contain a French calendar date.
    Absolute(String),
    /// Text that may contain a French relative phrase.
    Relative(String),
}

impl DateSignal {
    fn priority(&self) -> u8 {
        match self {
            Self::Attribute { .. } => 0,
            Self::Absolute(_) => 1,
            Self::Relative(_) => 2,
        }
    }

    fn raw_text(&self) -> Option<String> {
        let raw = match self {
            Self::Attribute { stamp, display } => display.as_deref().unwrap_or(stamp),
            Self::Absolute(text) | Self::Relative(text) => text,
        };
        let raw = raw.trim();
        (!raw.is_empty()).then(|| raw.to_string())
    }

    fn resolve(&self, now: NaiveDateTime) -> Option<NormalizedDate> {
        match self {
            Self::Attribute { stamp, display } => parse_timestamp(stamp).map(|canonical| NormalizedDate {
                canonical: Some(canonical),
                display: display.clone().filter(|d| !d.trim().is_empty()),
            }),
            Self::Absolute(text) => {
                let found = find_absolute(text)?;
                let date = found.date?;
                Some(NormalizedDate {
                    canonical: Some(date.and_time(NaiveTime::MIN)),
                    display: Some(found.matched),
                })
            }
            Self::Relative(text) => {
                let phrase = find_relative(text)?.0;
                Some(NormalizedDate {
                    canonical: Some(phrase.resolve(now)?),
                    display: Some(phrase.display()),
                })
            }
        }
    }
}

/// Result of date normalization: canonical timestamp and display text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDate {
    pub canonical: Option<NaiveDateTime>,
    pub display: Option<String>,
}

/// Resolve a set of signals from one card.
///
/// Signals are tried by priority regardless of slice order; the first that
/// yields a canonical value wins. When none does, the verbatim text of the
/// highest-priority signal is kept for display.
pub fn normalize(signals: &[DateSignal], now: NaiveDateTime) -> NormalizedDate {
    let mut ordered: Vec<&DateSignal> = signals.iter().collect();
    ordered.sort_by_key(|s| s.priority());

    if let Some(resolved) = ordered.iter().find_map(|s| s.resolve(now)) {
        return resolved;
    }

    NormalizedDate {
        canonical: None,
        display: ordered.iter().find_map(|s| s.raw_text()),
    }
}

/// Collect date signals from a review card.
///
/// A `<time>` element is authoritative for where the date lives: its
/// `datetime` attribute and its text become signals. Without one, the card
/// text is scanned and only the matched phrases are kept.
pub fn signals_from_fragment(fragment: ElementRef<'_>) -> Vec<DateSignal> {
    let mut signals = Vec::new();

    if let Some(time) = fragment.select(&TIME).next() {
        let text = collapse_text(time);
        let display = (!text.is_empty()).then(|| text.clone());
        if let Some(stamp) = time
            .value()
            .attr("datetime")
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            signals.push(DateSignal::Attribute {
                stamp: stamp.to_string(),
                display,
            });
        }
        if !text.is_empty() {
            signals.push(DateSignal::Absolute(text.clone()));
            signals.push(DateSignal::Relative(text));
        }
        return signals;
    }

    let text = collapse_text(fragment);
    if let Some(found) = find_absolute(&text) {
        signals.push(DateSignal::Absolute(found.matched));
    }
    if let Some((_, matched)) = find_relative(&text) {
        signals.push(DateSignal::Relative(matched));
    }
    signals
}

/// Parse a machine-readable stamp, dropping sub-second precision and any
/// timezone suffix. Date-only stamps resolve to midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let caps = STAMP.captures(raw)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?;
    let time = match (num(4), num(5)) {
        (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, num(6).unwrap_or(0))?,
        _ => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

/// Month number for a French month name. Accepts full names, abbreviations
/// with or without the trailing period, and unaccented spellings.
pub fn month_number(name: &str) -> Option<u32> {
    let name = name.trim().trim_end_matches('.').to_lowercase();
    let month = match name.as_str() {
        "janvier" | "janv" | "jan" => 1,
        "février" | "fevrier" | "févr" | "fevr" | "fév" | "fev" => 2,
        "mars" | "mar" => 3,
        "avril" | "avr" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" | "juil" => 7,
        "août" | "aout" | "aoû" | "aou" => 8,
        "septembre" | "sept" | "sep" => 9,
        "octobre" | "oct" => 10,
        "novembre" | "nov" => 11,
        "décembre" | "decembre" | "déc" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

struct AbsoluteMatch {
    matched: String,
    /// `None` when the phrase names a day that does not exist.
    date: Option<NaiveDate>,
}

fn find_absolute(text: &str) -> Option<AbsoluteMatch> {
    ABSOLUTE.captures_iter(text).find_map(|caps: Captures<'_>| {
        let month = month_number(caps.get(2)?.as_str())?;
        let day = caps.get(1)?.as_str().parse::<u32>().ok()?;
        let year = caps.get(3)?.as_str().parse::<i32>().ok()?;
        Some(AbsoluteMatch {
            matched: caps.get(0)?.as_str().trim().to_string(),
            date: NaiveDate::from_ymd_opt(year, month, day),
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl RelativeUnit {
    fn from_word(word: &str) -> Option<Self> {
        let word = word.to_lowercase();
        let unit = match word.as_str() {
            "jour" | "jours" => Self::Day,
            "semaine" | "semaines" => Self::Week,
            "mois" => Self::Month,
            "an" | "ans" | "année" | "années" | "annee" | "annees" => Self::Year,
            _ => return None,
        };
        Some(unit)
    }

    /// Length in days: months are 30 days, years 365.
    pub fn days(self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
            Self::Year => 365,
        }
    }

    fn word(self, amount: u32) -> &'static str {
        let plural = amount > 1;
        match (self, plural) {
            (Self::Day, false) => "jour",
            (Self::Day, true) => "jours",
            (Self::Week, false) => "semaine",
            (Self::Week, true) => "semaines",
            (Self::Month, _) => "mois",
            (Self::Year, false) => "an",
            (Self::Year, true) => "ans",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelativePhrase {
    Ago { amount: u32, unit: RelativeUnit },
    Yesterday,
    Today,
}

impl RelativePhrase {
    fn resolve(self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let days = match self {
            Self::Ago { amount, unit } => i64::from(amount).checked_mul(unit.days())?,
            Self::Yesterday => 1,
            Self::Today => 0,
        };
        now.checked_sub_signed(TimeDelta::try_days(days)?)
    }

    fn display(self) -> String {
        match self {
            Self::Ago { amount, unit } => format!("il y a {amount} {}", unit.word(amount)),
            Self::Yesterday => "hier".to_string(),
            Self::Today => "aujourd'hui".to_string(),
        }
    }
}

fn find_relative(text: &str) -> Option<(RelativePhrase, String)> {
    if let Some(caps) = RELATIVE_AGO.captures(text) {
        let amount = caps.get(1)?.as_str().parse::<u32>().ok();
        let unit = RelativeUnit::from_word(caps.get(2)?.as_str());
        if let (Some(amount), Some(unit)) = (amount, unit) {
            let matched = caps.get(0)?.as_str().to_string();
            return Some((RelativePhrase::Ago { amount, unit }, matched));
        }
    }

    let caps = RELATIVE_WORD.captures(text)?;
    let word = caps.get(1)?.as_str();
    let phrase = if word.eq_ignore_ascii_case("hier") {
        RelativePhrase::Yesterday
    } else {
        RelativePhrase::Today
    };
    Some((phrase, word.to_string()))
}
