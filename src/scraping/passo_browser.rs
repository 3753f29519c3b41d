use anyhow::Result;
use scraper::Html;

use super::crawl::{self, CategoryRule, DetailContext, Listing, ProfiledSite, SiteProfile};
use super::extract::{DetailChains, EventDraft, LinkRules, Strategy, TicketSelectors};
use super::{ScrapeContext, SourceScraper, Transport};
use crate::models::{Category, Event};

const LISTINGS: &[Listing] = &[Listing {
    url: "https://www.passo.com.tr/tr/kategori/muzik-konser-festival-biletleri/8615",
    category: CategoryRule::Fixed(Category::Music),
    label: "muzik-konser-festival",
}];

static PROFILE: SiteProfile = SiteProfile {
    id: "passo",
    name: "Passo",
    home_url: "https://www.passo.com.tr",
    transport: Transport::Browser,
    listings: LISTINGS,
    links: LinkRules {
        markers: &["/etkinlik/"],
        exclude: &[],
        cards: None,
    },
    detail_cap: 10,
    scrolls: 3,
};

const CHAINS: DetailChains = DetailChains {
    title: &[
        Strategy::Text("h1"),
        Strategy::Meta("og:title"),
        Strategy::JsonLd("name"),
        Strategy::PageTitle,
    ],
    start: &[
        Strategy::ItemProp("startDate"),
        Strategy::JsonLd("startDate"),
        Strategy::Text(".date"),
        Strategy::Text(".event-date"),
    ],
    end: &[Strategy::ItemProp("endDate"), Strategy::JsonLd("endDate")],
    venue: &[
        Strategy::Text(".place"),
        Strategy::Text(".event-venue"),
        Strategy::JsonLd("location.name"),
    ],
    address: &[
        Strategy::JsonLd("location.address.streetAddress"),
        Strategy::JsonLd("location.address"),
    ],
    description: &[
        Strategy::Html(".event-info"),
        Strategy::Html(".description"),
        Strategy::Meta("og:description"),
    ],
    image: &[Strategy::Meta("og:image"), Strategy::JsonLd("image")],
    price: &[
        Strategy::Text(".event-price"),
        Strategy::Text(".min-price"),
        Strategy::JsonLd("offers.lowPrice"),
    ],
    rules: &[".rules li", ".event-rules li"],
    tickets: &[
        TicketSelectors {
            block: ".ticket-type-list .item",
            name: &[".name"],
            price: &[".price"],
            status: &[".status", ".badge"],
            default_name: "General",
            price_in_parent: false,
        },
        TicketSelectors {
            block: ".price-category",
            name: &[".name"],
            price: &[".price"],
            status: &[".status"],
            default_name: "General",
            price_in_parent: false,
        },
    ],
};

pub struct Passo;

impl ProfiledSite for Passo {
    fn profile(&self) -> &'static SiteProfile {
        &PROFILE
    }

    fn parse_detail(&self, html: &str, ctx: &DetailContext<'_>) -> EventDraft {
        let document = Html::parse_document(html);
        CHAINS.extract(&document, ctx.today)
    }
}

impl SourceScraper for Passo {
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
    use crate::models::TicketStatus;
    use chrono::NaiveDate;

    const SAMPLE_HTML: &str = r#"
<html>
<head>
  <meta property="og:title" content="Duman | Passo" />
  <meta property="og:image" content="https://cdn.passo.com.tr/duman.jpg" />
  <meta itemprop="startDate" content="2025-12-6T21:00+3:00" />
</head>
<body>
  <h1> Duman </h1>
  <div class="place">Volkswagen Arena</div>
  <div class="event-info"><p>Duman sahnede!</p></div>
  <ul class="event-rules"><li>Etkinlik 18 yaş sınırı vardır.</li></ul>
  <div class="ticket-type-list">
    <div class="item"><span class="name">Bilet 1. Kategori</span><span class="price">1.500,00 TL</span></div>
    <div class="item"><span class="name">Bilet 2. Kategori</span><span class="price">900,00 TL</span><span class="status">TÜKENDİ</span></div>
  </div>
</body>
</html>"#;

    fn context() -> DetailContext<'static> {
        DetailContext {
            listing: &LISTINGS[0],
            url: "https://www.passo.com.tr/tr/etkinlik/duman-konseri/1234",
            today: NaiveDate::from_ymd_opt(2025, 11, 1).expect("date"),
        }
    }

    #[test]
    fn parses_detail_page() {
        let ctx = context();
        let event = Passo
            .parse_detail(SAMPLE_HTML, &ctx)
            .resolve(ctx.url, Category::Music)
            .expect("event");

        assert_eq!(event.title, "Duman");
        assert_eq!(event.venue_name, "Volkswagen Arena");
        assert_eq!(event.start_time.to_rfc3339(), "2025-12-06T18:00:00+00:00");
        assert_eq!(event.description.as_deref(), Some("<p>Duman sahnede!</p>"));
        assert_eq!(event.rules, vec!["Etkinlik 18 yaş sınırı vardır."]);
        assert_eq!(event.ticket_details.len(), 2);
        assert_eq!(event.ticket_details[0].price, "1.500,00 TL");
        assert_eq!(event.ticket_details[1].status, TicketStatus::SoldOut);
        assert_eq!(event.price.as_deref(), Some("900,00 TL"));
    }

    #[test]
    fn listing_links_follow_event_paths() {
        let listing = r##"
<a href="/tr/etkinlik/duman-konseri/1234">Duman</a>
<a href="/tr/etkinlik/duman-konseri/1234#bilet">Duman</a>
<a href="/tr/kategori/tiyatro/8612">Tiyatro</a>"##;
        let links = Passo.detail_links(listing, &LISTINGS[0]);
        assert_eq!(links, vec!["https://www.passo.com.tr/tr/etkinlik/duman-konseri/1234"]);
    }

    #[test]
    fn page_title_and_event_price_fill_gaps() {
        let ctx = context();
        let html = r#"<html><head><title>Teoman | Passo</title>
<meta itemprop="startDate" content="2025-12-20T21:00:00+03:00" /></head>
<body><div class="event-price">650 TL</div></body></html>"#;
        let event = Passo
            .parse_detail(html, &ctx)
            .resolve(ctx.url, Category::Music)
            .expect("event");
        assert_eq!(event.title, "Teoman");
        assert_eq!(event.price.as_deref(), Some("650 TL"));
        assert!(event.ticket_details.is_empty());
    }

    #[test]
    fn page_without_date_is_rejected() {
        let ctx = context();
        let html = "<html><body><h1>Tarihsiz Konser</h1></body></html>";
        assert!(Passo.parse_detail(html, &ctx).resolve(ctx.url, Category::Music).is_err());
    }
}
