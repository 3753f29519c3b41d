use anyhow::Result;
use scraper::Html;

use super::crawl::{self, CategoryRule, DetailContext, Listing, ProfiledSite, SiteProfile};
use super::extract::{DetailChains, EventDraft, LinkRules, Strategy, TicketSelectors};
use super::{ScrapeContext, SourceScraper, Transport};
use crate::models::{Category, Event};

const LISTINGS: &[Listing] = &[
    Listing {
        url: "https://www.biletix.com/search/TURKIYE/tr?searchq=M%C3%BCzik",
        category: CategoryRule::Fixed(Category::Music),
        label: "search-muzik",
    },
    Listing {
        url: "https://www.biletix.com/search/TURKIYE/tr?searchq=Tiyatro",
        category: CategoryRule::Fixed(Category::Theatre),
        label: "search-tiyatro",
    },
];

static PROFILE: SiteProfile = SiteProfile {
    id: "biletix",
    name: "Biletix",
    home_url: "https://www.biletix.com",
    transport: Transport::Browser,
    listings: LISTINGS,
    links: LinkRules {
        markers: &["/etkinlik/"],
        exclude: &[],
        cards: None,
    },
    detail_cap: 10,
    scrolls: 2,
};

const CHAINS: DetailChains = DetailChains {
    title: &[
        Strategy::Text("h1"),
        Strategy::Text(".event-name"),
        Strategy::Meta("og:title"),
        Strategy::PageTitle,
    ],
    start: &[
        Strategy::ItemProp("startDate"),
        Strategy::JsonLd("startDate"),
        Strategy::Text(".date-time"),
        Strategy::Text(".eventDate"),
    ],
    end: &[Strategy::ItemProp("endDate"), Strategy::JsonLd("endDate")],
    venue: &[
        Strategy::Text(".place"),
        Strategy::Text(".venue-name"),
        Strategy::Text(".placeName"),
        Strategy::JsonLd("location.name"),
    ],
    address: &[
        Strategy::Text(".venue-address"),
        Strategy::JsonLd("location.address.streetAddress"),
    ],
    description: &[
        Strategy::Html(".event-description"),
        Strategy::Html("#tab_aciklama"),
        Strategy::Meta("og:description"),
    ],
    image: &[Strategy::Meta("og:image")],
    price: &[
        Strategy::Text(".ticket-price"),
        Strategy::JsonLd("offers.lowPrice"),
    ],
    rules: &["#tab_kurallar li", ".rules li"],
    // Category labels sit next to their price, not around it.
    tickets: &[TicketSelectors {
        block: ".price-category, .category-name, .prices .price-name",
        name: &[],
        price: &[".price-amount"],
        status: &[],
        default_name: "Kategori",
        price_in_parent: true,
    }],
};

pub struct Biletix;

impl ProfiledSite for Biletix {
    fn profile(&self) -> &'static SiteProfile {
        &PROFILE
    }

    fn parse_detail(&self, html: &str, ctx: &DetailContext<'_>) -> EventDraft {
        let document = Html::parse_document(html);
        CHAINS.extract(&document, ctx.today)
    }
}

impl SourceScraper for Biletix {
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
