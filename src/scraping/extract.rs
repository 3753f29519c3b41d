//! Heuristic field extraction for detail pages.
//!
//! Every site exposes the same facts through different markup, and the markup
//! shifts between deploys. Each field is therefore described as an ordered
//! chain of [`Strategy`] values; the first strategy producing a non-empty value
//! wins. Chains are plain `const` slices inside each adapter.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::base;
use crate::models::{Category, Event, GeoPoint, TicketDetail, TicketStatus, UNKNOWN_VENUE};
use crate::normalize;

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
static DATA_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[data-href], [data-url], [data-link]").expect("data link selector")
});
static ONCLICK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[onclick]").expect("onclick selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector"));
static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("json-ld selector")
});
static LATLNG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-latlng]").expect("latlng selector"));
static MAPS_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"a[href*="google.com/maps"], a[href*="maps.google"], a[href*="goo.gl/maps"], iframe[src*="google.com/maps"]"#,
    )
    .expect("maps link selector")
});
static ONCLICK_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:location(?:\.href)?\s*=|window\.open\()\s*['"]([^'"]+)['"]"#)
        .expect("onclick url regex")
});
static MAPS_COORD_RES: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        r"destination=(-?\d+(?:\.\d+)?)(?:,|%2C)\s*(-?\d+(?:\.\d+)?)",
        r"@(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)",
        r"query=(-?\d+(?:\.\d+)?)(?:,|%2C)\s*(-?\d+(?:\.\d+)?)",
        r"[?&]q=(-?\d+(?:\.\d+)?)(?:,|%2C)\s*(-?\d+(?:\.\d+)?)",
    ]
    .map(|pattern| Regex::new(pattern).expect("maps coordinate regex"))
});

/// A value that one extraction either produced or could not find.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Found(T),
    Unresolved,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unresolved
    }
}

impl<T> Field<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Field::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Found(value) => Some(value),
            Field::Unresolved => None,
        }
    }

    pub fn or_else(self, fallback: impl FnOnce() -> Field<T>) -> Field<T> {
        match self {
            Field::Found(value) => Field::Found(value),
            Field::Unresolved => fallback(),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Field::Found(value),
            None => Field::Unresolved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Visible text of the first non-empty match.
    Text(&'static str),
    /// Inner HTML of the first non-empty match.
    Html(&'static str),
    Attr(&'static str, &'static str),
    /// `<meta property=..>` or `<meta name=..>` content.
    Meta(&'static str),
    /// schema.org microdata, read from `content`, `datetime` or text.
    ItemProp(&'static str),
    /// Dotted path into any JSON-LD block, e.g. `location.name`.
    JsonLd(&'static str),
    /// `<title>` up to the first `|`.
    PageTitle,
}

impl Strategy {
    pub fn apply(&self, document: &Html) -> Option<String> {
        match *self {
            Strategy::Text(css) => select_all(document, css)
                .into_iter()
                .map(base::inner_text)
                .find(|text| !text.is_empty()),
            Strategy::Html(css) => select_all(document, css)
                .into_iter()
                .map(|el| el.inner_html().trim().to_string())
                .find(|html| !html.is_empty()),
            Strategy::Attr(css, attr) => first_attr_value(document, css, &[attr]),
            Strategy::Meta(name) => {
                let css = format!(r#"meta[property="{name}"], meta[name="{name}"]"#);
                first_attr_value(document, &css, &["content"])
            }
            Strategy::ItemProp(name) => {
                let css = format!(r#"[itemprop="{name}"]"#);
                let elements = select_all(document, &css);
                elements.into_iter().find_map(|el| {
                    ["content", "datetime", "href", "src"]
                        .iter()
                        .find_map(|attr| el.value().attr(attr))
                        .map(|value| value.trim().to_string())
                        .or_else(|| Some(base::inner_text(el)))
                        .filter(|value| !value.is_empty())
                })
            }
            Strategy::JsonLd(path) => json_ld_blocks(document)
                .iter()
                .find_map(|block| json_lookup(block, path)),
            Strategy::PageTitle => document
                .select(&TITLE_SELECTOR)
                .next()
                .map(base::inner_text)
                .and_then(|title| title.split('|').next().map(|part| part.trim().to_string()))
                .filter(|title| !title.is_empty()),
        }
    }
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(err) => {
            debug!(css, "invalid selector: {err:?}");
            Vec::new()
        }
    }
}

fn first_attr_value(document: &Html, css: &str, attrs: &[&str]) -> Option<String> {
    select_all(document, css).into_iter().find_map(|el| {
        attrs
            .iter()
            .filter_map(|attr| el.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    })
}

fn json_ld_blocks(document: &Html) -> Vec<Value> {
    document
        .select(&JSON_LD_SELECTOR)
        .filter_map(|script| {
            let raw = script.text().collect::<String>();
            serde_json::from_str::<Value>(raw.trim()).ok()
        })
        .collect()
}

fn json_lookup(value: &Value, path: &str) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(|item| json_lookup(item, path)),
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                if let Some(found) = json_lookup(graph, path) {
                    return Some(found);
                }
            }
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let next = map.get(head)?;
            match rest {
                Some(rest) => json_lookup(next, rest),
                None => json_scalar(next),
            }
        }
        _ => None,
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => base::non_empty(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => items.iter().find_map(json_scalar),
        Value::Object(map) => map.get("url").or_else(|| map.get("name")).and_then(json_scalar),
        _ => None,
    }
}

pub fn resolve_text(document: &Html, chain: &[Strategy]) -> Field<String> {
    chain
        .iter()
        .find_map(|strategy| strategy.apply(document))
        .into()
}

pub fn resolve_start(document: &Html, chain: &[Strategy], today: NaiveDate) -> Field<DateTime<Utc>> {
    resolve_instant(document, chain, today)
}

pub fn resolve_end(document: &Html, chain: &[Strategy], today: NaiveDate) -> Field<DateTime<Utc>> {
    resolve_instant(document, chain, today)
}

fn resolve_instant(document: &Html, chain: &[Strategy], today: NaiveDate) -> Field<DateTime<Utc>> {
    chain
        .iter()
        .filter_map(|strategy| strategy.apply(document))
        .find_map(|raw| {
            normalize::normalize_date(&raw).or_else(|| normalize::parse_turkish_date(&raw, today))
        })
        .into()
}

/// First strategy value that reads as a price, e.g. `450 TL` but not `Detaylar`.
pub fn resolve_price(document: &Html, chain: &[Strategy]) -> Field<String> {
    chain
        .iter()
        .filter_map(|strategy| strategy.apply(document))
        .map(|raw| base::clean_text(&raw))
        .find(|raw| normalize::parse_price(raw).is_some())
        .into()
}

/// Texts of the first selector that matches anything, e.g. a rules list.
pub fn resolve_list(document: &Html, selectors: &[&str]) -> Vec<String> {
    for css in selectors {
        let items: Vec<String> = select_all(document, css)
            .into_iter()
            .map(base::inner_text)
            .filter(|text| !text.is_empty())
            .collect();
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

#[derive(Debug, Clone, Copy)]
pub struct TicketSelectors {
    pub block: &'static str,
    /// Empty means the block's own text is the ticket name.
    pub name: &'static [&'static str],
    pub price: &'static [&'static str],
    pub status: &'static [&'static str],
    pub default_name: &'static str,
    /// Some layouts put the price next to the block instead of inside it.
    pub price_in_parent: bool,
}

pub fn resolve_tickets(document: &Html, layouts: &[TicketSelectors]) -> Vec<TicketDetail> {
    for layout in layouts {
        let tickets: Vec<TicketDetail> = select_all(document, layout.block)
            .into_iter()
            .filter_map(|block| ticket_from_block(block, layout))
            .collect();
        if !tickets.is_empty() {
            return tickets;
        }
    }
    Vec::new()
}

fn ticket_from_block(block: ElementRef<'_>, layout: &TicketSelectors) -> Option<TicketDetail> {
    let name = if layout.name.is_empty() {
        base::non_empty(base::inner_text(block))
    } else {
        first_text_in(block, layout.name)
    }
    .unwrap_or_else(|| layout.default_name.to_string());
    let price = first_text_in(block, layout.price).or_else(|| {
        if !layout.price_in_parent {
            return None;
        }
        block
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| first_text_in(parent, layout.price))
    })?;
    let status_text = first_text_in(block, layout.status).unwrap_or_else(|| base::inner_text(block));
    Some(TicketDetail {
        name,
        price,
        status: TicketStatus::from_text(&status_text),
    })
}

fn first_text_in(element: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        base::first_text(&element, &selector)
    })
}

/// Coordinates from `data-latlng`, embedded Google Maps links or JSON-LD `geo`.
pub fn resolve_geo(document: &Html) -> Field<GeoPoint> {
    let from_attr = document
        .select(&LATLNG_SELECTOR)
        .filter_map(|el| el.value().attr("data-latlng"))
        .find_map(parse_lat_lng);
    if let Some(point) = from_attr {
        return Field::Found(point);
    }

    let from_maps = document
        .select(&MAPS_LINK_SELECTOR)
        .filter_map(|el| el.value().attr("href").or_else(|| el.value().attr("src")))
        .find_map(coordinates_from_maps_url);
    if let Some(point) = from_maps {
        return Field::Found(point);
    }

    let blocks = json_ld_blocks(document);
    blocks
        .iter()
        .find_map(|block| {
            let lat = json_lookup(block, "location.geo.latitude")
                .or_else(|| json_lookup(block, "geo.latitude"))?;
            let lng = json_lookup(block, "location.geo.longitude")
                .or_else(|| json_lookup(block, "geo.longitude"))?;
            GeoPoint::new(lat.parse().ok()?, lng.parse().ok()?)
        })
        .into()
}

fn parse_lat_lng(raw: &str) -> Option<GeoPoint> {
    let (lat, lng) = raw.split_once(',')?;
    GeoPoint::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?)
}

pub fn coordinates_from_maps_url(url: &str) -> Option<GeoPoint> {
    MAPS_COORD_RES.iter().find_map(|re| {
        let caps = re.captures(url)?;
        GeoPoint::new(caps.get(1)?.as_str().parse().ok()?, caps.get(2)?.as_str().parse().ok()?)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no title found")]
    MissingTitle,
    #[error("no parseable start time found")]
    MissingStartTime,
}

/// Everything one detail page yielded, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDraft {
    pub title: Field<String>,
    pub venue_name: Field<String>,
    pub address: Field<String>,
    pub start_time: Field<DateTime<Utc>>,
    pub end_time: Field<DateTime<Utc>>,
    pub description: Field<String>,
    pub image_url: Field<String>,
    pub geo: Field<GeoPoint>,
    pub price: Field<String>,
    pub ticket_details: Vec<TicketDetail>,
    pub rules: Vec<String>,
    pub tags: Vec<String>,
}

impl EventDraft {
    pub fn resolve(self, source_url: &str, category: Category) -> Result<Event, Rejection> {
        let title = self
            .title
            .into_option()
            .map(|title| base::clean_text(&title))
            .filter(|title| !title.is_empty())
            .ok_or(Rejection::MissingTitle)?;
        let start_time = self
            .start_time
            .into_option()
            .ok_or(Rejection::MissingStartTime)?;

        let venue_name = self
            .venue_name
            .into_option()
            .map(|venue| base::clean_text(&venue))
            .filter(|venue| !venue.is_empty())
            .unwrap_or_else(|| UNKNOWN_VENUE.to_string());
        let price = self
            .price
            .into_option()
            .or_else(|| cheapest_ticket(&self.ticket_details));
        let image_url = base::absolute_url(source_url, self.image_url.into_option());

        Ok(Event {
            title,
            venue_name,
            address: self.address.into_option().map(|a| base::clean_text(&a)),
            start_time,
            end_time: self.end_time.into_option().filter(|end| *end >= start_time),
            description: self.description.into_option(),
            image_url,
            source_url: source_url.to_string(),
            category,
            geo: self.geo.into_option(),
            price,
            ticket_details: self.ticket_details,
            rules: self.rules,
            tags: self.tags,
            is_approved: false,
        })
    }
}

// Unpriced lines such as `Ücretsiz` only count when nothing else parses.
fn cheapest_ticket(tickets: &[TicketDetail]) -> Option<String> {
    tickets
        .iter()
        .filter_map(|ticket| normalize::parse_price(&ticket.price).map(|value| (value, ticket)))
        .min_by_key(|(value, _)| *value)
        .map(|(_, ticket)| ticket)
        .or_else(|| tickets.first())
        .map(|ticket| ticket.price.clone())
}

/// Which anchors on a listing page lead to event detail pages.
#[derive(Debug, Clone, Copy)]
pub struct LinkRules {
    pub markers: &'static [&'static str],
    pub exclude: &'static [&'static str],
    /// Card elements whose `href` is a detail link whatever its path.
    pub cards: Option<&'static str>,
}

impl LinkRules {
    fn excludes(&self, url: &str) -> bool {
        self.exclude.iter().any(|pattern| url.contains(pattern))
    }

    fn accepts(&self, url: &str) -> bool {
        self.markers.iter().any(|marker| url.contains(marker)) && !self.excludes(url)
    }
}

pub fn collect_detail_links(html: &str, base_url: &str, rules: &LinkRules) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut candidates: Vec<String> = Vec::new();

    candidates.extend(
        document
            .select(&ANCHOR_SELECTOR)
            .filter_map(|el| el.value().attr("href"))
            .map(str::to_string),
    );
    for el in document.select(&DATA_LINK_SELECTOR) {
        for attr in ["data-href", "data-url", "data-link"] {
            if let Some(value) = el.value().attr(attr) {
                candidates.push(value.to_string());
            }
        }
    }
    for el in document.select(&ONCLICK_SELECTOR) {
        if let Some(script) = el.value().attr("onclick") {
            candidates.extend(
                ONCLICK_URL_RE
                    .captures_iter(script)
                    .filter_map(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string()),
            );
        }
    }

    let cards: Vec<String> = rules
        .cards
        .and_then(|css| Selector::parse(css).ok())
        .map(|selector| {
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("href"))
                .filter_map(|href| base::absolute_url(base_url, Some(href.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|href| base::absolute_url(base_url, Some(href)))
        .filter(|url| rules.accepts(url) || (cards.contains(url) && !rules.excludes(url)))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Per-site strategy chains for every field of a detail page.
#[derive(Debug, Clone, Copy)]
pub struct DetailChains {
    pub title: &'static [Strategy],
    pub start: &'static [Strategy],
    pub end: &'static [Strategy],
    pub venue: &'static [Strategy],
    pub address: &'static [Strategy],
    pub description: &'static [Strategy],
    pub image: &'static [Strategy],
    pub price: &'static [Strategy],
    pub rules: &'static [&'static str],
    pub tickets: &'static [TicketSelectors],
}

impl DetailChains {
    pub fn extract(&self, document: &Html, today: NaiveDate) -> EventDraft {
        EventDraft {
            title: resolve_text(document, self.title),
            venue_name: resolve_text(document, self.venue),
            address: resolve_text(document, self.address),
            start_time: resolve_start(document, self.start, today),
            end_time: resolve_end(document, self.end, today),
            description: resolve_text(document, self.description),
            image_url: resolve_text(document, self.image),
            geo: resolve_geo(document),
            price: resolve_price(document, self.price),
            ticket_details: resolve_tickets(document, self.tickets),
            rules: resolve_list(document, self.rules),
            tags: Vec::new(),
        }
    }
}
