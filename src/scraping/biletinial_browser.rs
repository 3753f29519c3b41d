use anyhow::Result;
use scraper::Html;

use super::crawl::{self, CategoryRule, DetailContext, Listing, ProfiledSite, SiteProfile};
use super::extract::{DetailChains, EventDraft, LinkRules, Strategy, TicketSelectors};
use super::{ScrapeContext, SourceScraper, Transport};
use crate::models::{Category, Event};

const LISTINGS: &[Listing] = &[
    Listing {
        url: "https://biletinial.com/tr-tr/muzik",
        category: CategoryRule::Fixed(Category::Music),
        label: "muzik",
    },
    Listing {
        url: "https://biletinial.com/tr-tr/muzik/ankara",
        category: CategoryRule::Fixed(Category::Music),
        label: "muzik-ankara",
    },
    Listing {
        url: "https://biletinial.com/tr-tr/tiyatro/ankara",
        category: CategoryRule::Fixed(Category::Theatre),
        label: "tiyatro-ankara",
    },
    Listing {
        url: "https://biletinial.com/tr-tr/spor/ankara",
        category: CategoryRule::Fixed(Category::Sports),
        label: "spor-ankara",
    },
];

static PROFILE: SiteProfile = SiteProfile {
    id: "biletinial",
    name: "Biletinial",
    home_url: "https://biletinial.com",
    transport: Transport::Browser,
    listings: LISTINGS,
    links: LinkRules {
        markers: &["/etkinlik/"],
        exclude: &[],
        cards: Some("a.event-card"),
    },
    detail_cap: 20,
    scrolls: 2,
};

const CHAINS: DetailChains = DetailChains {
    title: &[
        Strategy::Text("h1"),
        Strategy::Text(".event-title"),
        Strategy::Meta("og:title"),
        Strategy::PageTitle,
    ],
    start: &[
        Strategy::ItemProp("startDate"),
        Strategy::JsonLd("startDate"),
        Strategy::Text(".event-date"),
        Strategy::Text(".date"),
    ],
    end: &[Strategy::ItemProp("endDate")],
    venue: &[
        Strategy::Text(".place"),
        Strategy::Text(".venue"),
        Strategy::JsonLd("location.name"),
    ],
    address: &[Strategy::JsonLd("location.address.streetAddress")],
    description: &[
        Strategy::Html(".event-content"),
        Strategy::Html(".description"),
        Strategy::Meta("og:description"),
    ],
    image: &[Strategy::Meta("og:image")],
    price: &[
        Strategy::Text(".min-price"),
        Strategy::JsonLd("offers.lowPrice"),
    ],
    rules: &[".event-rules li", "#rules li"],
    tickets: &[TicketSelectors {
        block: ".price-option",
        name: &[".name"],
        price: &[".price"],
        status: &[".status"],
        default_name: "Ticket",
        price_in_parent: false,
    }],
};

pub struct Biletinial;

impl ProfiledSite for Biletinial {
    fn profile(&self) -> &'static SiteProfile {
        &PROFILE
    }

    fn parse_detail(&self, html: &str, ctx: &DetailContext<'_>) -> EventDraft {
        let document = Html::parse_document(html);
        CHAINS.extract(&document, ctx.today)
    }
}

impl SourceScraper for Biletinial {
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
