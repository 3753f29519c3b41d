use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::base;
use super::crawl::{self, CategoryRule, DetailContext, Listing, ProfiledSite, SiteProfile};
use super::extract::{
    resolve_geo, resolve_price, resolve_start, resolve_text, EventDraft, Field, LinkRules,
    Strategy,
};
use super::{ScrapeContext, SourceScraper, Transport};
use crate::models::Event;

// The city doubles as venue and address fallback.
const LISTINGS: &[Listing] = &[
    Listing {
        url: "https://www.bubilet.com.tr/ankara",
        category: CategoryRule::Detect,
        label: "Ankara",
    },
    Listing {
        url: "https://www.bubilet.com.tr/istanbul",
        category: CategoryRule::Detect,
        label: "İstanbul",
    },
    Listing {
        url: "https://www.bubilet.com.tr/izmir",
        category: CategoryRule::Detect,
        label: "İzmir",
    },
    Listing {
        url: "https://www.bubilet.com.tr/antalya",
        category: CategoryRule::Detect,
        label: "Antalya",
    },
    Listing {
        url: "https://www.bubilet.com.tr/bursa",
        category: CategoryRule::Detect,
        label: "Bursa",
    },
];

static PROFILE: SiteProfile = SiteProfile {
    id: "bubilet",
    name: "Bubilet",
    home_url: "https://www.bubilet.com.tr",
    transport: Transport::Http,
    listings: LISTINGS,
    links: LinkRules {
        markers: &["/etkinlik/"],
        exclude: &["/seans/"],
        cards: None,
    },
    detail_cap: 15,
    scrolls: 0,
};

const TITLE: &[Strategy] = &[Strategy::Meta("og:title"), Strategy::PageTitle];
const START: &[Strategy] = &[
    Strategy::ItemProp("startDate"),
    Strategy::JsonLd("startDate"),
    Strategy::Text("[class*='date']"),
    Strategy::Text("time"),
    Strategy::Text("body"),
];
const DESCRIPTION: &[Strategy] = &[Strategy::Meta("og:description"), Strategy::Meta("description")];
const IMAGE: &[Strategy] = &[Strategy::Meta("og:image")];
const VENUE: &[Strategy] = &[Strategy::Text("a[href*='/mekan/']")];
const ADDRESS: &[Strategy] = &[Strategy::Text("[class*='address']")];
const PRICE: &[Strategy] = &[Strategy::Text("[class*='price']")];

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*₺").expect("bubilet price regex"));
static TITLE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*biletleri?\s*$").expect("bubilet title suffix regex"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("bubilet body selector"));

pub struct Bubilet;

impl ProfiledSite for Bubilet {
    fn profile(&self) -> &'static SiteProfile {
        &PROFILE
    }

    fn parse_detail(&self, html: &str, ctx: &DetailContext<'_>) -> EventDraft {
        let document = Html::parse_document(html);
        let city = ctx.listing.label;

        let title = resolve_text(&document, TITLE)
            .into_option()
            .map(|raw| clean_title(&raw))
            .filter(|title| title.chars().count() >= 3);
        let price = resolve_price(&document, PRICE).or_else(|| {
            document
                .select(&BODY_SELECTOR)
                .next()
                .map(base::inner_text)
                .and_then(|text| {
                    PRICE_RE
                        .captures(&text)
                        .and_then(|caps| caps.get(1))
                        .map(|m| format!("{} TL", m.as_str()))
                })
                .into()
        });

        EventDraft {
            title: title.into(),
            venue_name: resolve_text(&document, VENUE).or_else(|| Field::Found(city.to_string())),
            address: resolve_text(&document, ADDRESS).or_else(|| Field::Found(city.to_string())),
            start_time: resolve_start(&document, START, ctx.today),
            description: resolve_text(&document, DESCRIPTION),
            image_url: resolve_text(&document, IMAGE),
            geo: resolve_geo(&document),
            price,
            tags: vec![city.to_string()],
            ..EventDraft::default()
        }
    }
}

fn clean_title(raw: &str) -> String {
    let head = raw.split('|').next().unwrap_or(raw).trim();
    TITLE_SUFFIX_RE.replace(head, "").trim().to_string()
}

impl SourceScraper for Bubilet {
    fn source_id(&self) -> &'static str {
        PROFILE.id
    }

    fn source_name(&self) -> &'static str {
        PROFILE.name
    }

    fn source_url(&self) -> &'static str {
        PROFILE.home_url
    }

    fn transport(&self) -> Transport {
        PROFILE.transport
    }

    fn scrape(&self, ctx: &mut ScrapeContext<'_>) -> Result<Vec<Event>> {
        crawl::crawl_site(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::NaiveDate;

    const SAMPLE_HTML: &str = r#"
<html>
<head>
  <title>Mabel Matiz Biletleri | Bubilet</title>
  <meta property="og:title" content="Mabel Matiz Konseri Biletleri | Bubilet" />
  <meta property="og:description" content="Mabel Matiz Congresium sahnesinde." />
  <meta property="og:image" content="https://cdn.bubilet.com.tr/mabel.jpg" />
</head>
<body>
  <h1>Mabel Matiz Konseri</h1>
  <div class="event-date">24 Aralık - 21:30</div>
  <a href="/ankara/mekan/congresium-ankara">Congresium Ankara</a>
  <div class="venue-address">Söğütözü Cd. No:1, Çankaya</div>
  <span class="amount">2.200₺</span>
  <a href="https://www.google.com/maps/dir/?api=1&destination=39.9097,32.8115">Yol Tarifi</a>
</body>
</html>"#;

    fn context() -> DetailContext<'static> {
        DetailContext {
            listing: &LISTINGS[0],
            url: "https://www.bubilet.com.tr/ankara/etkinlik/mabel-matiz-konseri",
            today: NaiveDate::from_ymd_opt(2025, 11, 1).expect("date"),
        }
    }

    #[test]
    fn parses_detail_page() {
        let ctx = context();
        let draft = Bubilet.parse_detail(SAMPLE_HTML, &ctx);
        let category = ctx.listing.category.pick(&draft);
        let event = draft.resolve(ctx.url, category).expect("event");

        assert_eq!(event.title, "Mabel Matiz Konseri");
        assert_eq!(event.category, Category::Music);
        assert_eq!(event.venue_name, "Congresium Ankara");
        assert_eq!(event.address.as_deref(), Some("Söğütözü Cd. No:1, Çankaya"));
        assert_eq!(event.start_time.to_rfc3339(), "2025-12-24T18:30:00+00:00");
        assert_eq!(event.price.as_deref(), Some("2.200 TL"));
        assert_eq!(event.tags, vec!["Ankara"]);
        let geo = event.geo.expect("geo");
        assert!((geo.lat - 39.9097).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_city_and_page_title() {
        let ctx = context();
        let html = r#"<html><head><title>Kuğu Gölü Bale Gösterisi | Bubilet</title></head>
<body><p>5 Ocak 20:00</p></body></html>"#;
        let draft = Bubilet.parse_detail(html, &ctx);
        let category = ctx.listing.category.pick(&draft);
        let event = draft.resolve(ctx.url, category).expect("event");

        assert_eq!(event.title, "Kuğu Gölü Bale Gösterisi");
        assert_eq!(event.category, Category::Art);
        assert_eq!(event.venue_name, "Ankara");
        assert_eq!(event.address.as_deref(), Some("Ankara"));
        assert_eq!(event.start_time.to_rfc3339(), "2026-01-05T17:00:00+00:00");
        assert_eq!(event.price, None);
    }

    #[test]
    fn price_element_wins_over_body_text() {
        let ctx = context();
        let html = r#"<html><head><title>Duman Konseri | Bubilet</title></head>
<body><p>24 Aralık 21:00</p><span class="min-price">450 TL</span><span class="amount">2.200₺</span></body></html>"#;
        let event = Bubilet
            .parse_detail(html, &ctx)
            .resolve(ctx.url, Category::Music)
            .expect("event");
        assert_eq!(event.price.as_deref(), Some("450 TL"));
    }

    #[test]
    fn short_titles_are_rejected() {
        let ctx = context();
        let html = r#"<html><head><meta property="og:title" content="Bu | Bubilet"></head><body>5 Ocak</body></html>"#;
        assert!(Bubilet.parse_detail(html, &ctx).resolve(ctx.url, Category::Art).is_err());
    }

    #[test]
    fn session_links_are_skipped() {
        let listing = r#"
<a href="/ankara/etkinlik/mabel-matiz-konseri">Mabel</a>
<a href="/ankara/etkinlik/mabel-matiz-konseri/seans/77">Seans</a>
<a href="/ankara/mekan/congresium-ankara">Mekan</a>"#;
        let links = Bubilet.detail_links(listing, &LISTINGS[0]);
        assert_eq!(links, vec!["https://www.bubilet.com.tr/ankara/etkinlik/mabel-matiz-konseri"]);
    }
}
