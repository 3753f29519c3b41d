//! Pure normalizers shared by every source adapter.
//!
//! Ticketing sites publish timestamps, prices and category hints in loosely
//! formatted Turkish-locale strings. Everything here is total: bad input yields
//! `None` (or a fallback category), never a panic or an error.

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Category;

/// Time zone assumed for timestamps that carry no offset.
pub const HOME_TIMEZONE: Tz = chrono_tz::Europe::Istanbul;

const DEFAULT_EVENT_HOUR: u32 = 20;

static OFFSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-])(\d):(\d{2})$").expect("valid offset regex"));
static SHORT_HOUR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d):").expect("valid hour regex"));
static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:tl|try|₺)").expect("valid currency regex"));
static PRICE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid price regex"));
static TURKISH_DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s+([^\d\s,.\-/]+)\.?,?(?:\s+(\d{4}))?").expect("valid turkish date regex")
});
static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("valid clock regex"));

const TURKISH_MONTHS: [(&str, u32); 12] = [
    ("ocak", 1),
    ("şubat", 2),
    ("mart", 3),
    ("nisan", 4),
    ("mayıs", 5),
    ("haziran", 6),
    ("temmuz", 7),
    ("ağustos", 8),
    ("eylül", 9),
    ("ekim", 10),
    ("kasım", 11),
    ("aralık", 12),
];

// Order matters: the first keyword found wins.
const CATEGORY_KEYWORDS: [(&str, Category); 17] = [
    ("konser", Category::Music),
    ("tiyatro", Category::Theatre),
    ("stand-up", Category::StandUp),
    ("stand up", Category::StandUp),
    ("bale", Category::Art),
    ("opera", Category::Art),
    ("dans", Category::Art),
    ("gösteri", Category::Art),
    ("festival", Category::Festival),
    ("parti", Category::Party),
    ("dj", Category::Party),
    ("çocuk", Category::Family),
    ("aile", Category::Family),
    ("spor", Category::Sports),
    ("müzikal", Category::Theatre),
    ("workshop", Category::Education),
    ("seminer", Category::Education),
];

/// Repairs and parses a sloppy ISO-8601 timestamp such as `2025-9-5T11:00+3:00`.
pub fn normalize_date(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    parse_instant(&pad_components(trimmed))
}

fn pad_components(input: &str) -> String {
    let (date_part, time_part) = match input.split_once(|c: char| c == 'T' || c == ' ') {
        Some((date, time)) => (date, Some(time.trim())),
        None => (input, None),
    };

    let pieces: Vec<&str> = date_part.split('-').collect();
    let date = if pieces.len() == 3 {
        format!("{}-{}-{}", pieces[0], pad2(pieces[1]), pad2(pieces[2]))
    } else {
        date_part.to_string()
    };

    match time_part {
        Some(time) => {
            let time = OFFSET_RE.replace(time, "${1}0${2}:${3}");
            let time = SHORT_HOUR_RE.replace(&time, "0${1}:");
            format!("{date}T{time}")
        }
        None => date,
    }
}

fn pad2(piece: &str) -> String {
    if piece.len() == 1 {
        format!("0{piece}")
    } else {
        piece.to_string()
    }
}

fn parse_instant(candidate: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(candidate) {
        return Some(dt.with_timezone(&Utc));
    }

    let zulu_fixed;
    let candidate = match candidate.strip_suffix('Z').or_else(|| candidate.strip_suffix('z')) {
        Some(stripped) => {
            zulu_fixed = format!("{stripped}+00:00");
            zulu_fixed.as_str()
        }
        None => candidate,
    };

    for fmt in [
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, fmt) {
            return localize(naive);
        }
    }

    NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
        .ok()
        .and_then(|date| localize(date.and_time(NaiveTime::MIN)))
}

fn localize(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match HOME_TIMEZONE.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Parses Turkish listing text like `24 Aralık - 21:30` or `5 Eyl 2025 Cuma 19:00`.
///
/// Without an explicit year the next occurrence on or after `today` is used;
/// without a clock time the event is assumed to start at 20:00.
pub fn parse_turkish_date(text: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
    let date = TURKISH_DAY_MONTH_RE.captures_iter(text).find_map(|caps| {
        let day: u32 = caps.get(1)?.as_str().parse().ok()?;
        let month = month_from_token(caps.get(2)?.as_str())?;
        let year = caps
            .get(3)
            .and_then(|y| y.as_str().parse::<i32>().ok())
            .unwrap_or_else(|| upcoming_year(today, month, day));
        NaiveDate::from_ymd_opt(year, month, day)
    })?;

    let (hour, minute) = CLOCK_RE
        .captures(text)
        .and_then(|caps| {
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
            Some((hour, minute))
        })
        .unwrap_or((DEFAULT_EVENT_HOUR, 0));

    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    localize(NaiveDateTime::new(date, time))
}

fn upcoming_year(today: NaiveDate, month: u32, day: u32) -> i32 {
    if (month, day) < (today.month(), today.day()) {
        today.year() + 1
    } else {
        today.year()
    }
}

fn month_from_token(token: &str) -> Option<u32> {
    let wanted = fold_dotless(&token.to_lowercase());
    if wanted.chars().count() < 3 {
        return None;
    }
    TURKISH_MONTHS.iter().find_map(|(name, number)| {
        let name = fold_dotless(name);
        (name == wanted || name.starts_with(&wanted)).then_some(*number)
    })
}

// Uppercase `I` lowercases to `i`, so compare with the dotless variant folded away.
fn fold_dotless(value: &str) -> String {
    value.replace('ı', "i").replace('\u{307}', "")
}

/// Parses a Turkish-locale price (`1.250,50 TL`) to whole lira, rounded.
pub fn parse_price(input: &str) -> Option<i64> {
    let stripped = CURRENCY_RE.replace_all(input, "");
    let compact: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = compact.replace('.', "").replacen(',', ".", 1);
    let number = PRICE_NUMBER_RE.find(&normalized)?;
    let value: f64 = number.as_str().parse().ok()?;
    value.is_finite().then(|| value.round() as i64)
}

/// Lowest parseable price among `prices`, if any.
pub fn min_price<'a, I>(prices: I) -> Option<i64>
where
    I: IntoIterator<Item = &'a str>,
{
    prices.into_iter().filter_map(parse_price).min()
}

pub fn detect_category(title: &str, description: &str) -> Category {
    let text = format!("{title} {description}").to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Art)
}
