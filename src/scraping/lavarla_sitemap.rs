use std::collections::HashSet;

use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::crawl::{self, CategoryRule, DetailContext, Listing, ProfiledSite, SiteProfile};
use super::extract::{DetailChains, EventDraft, LinkRules, Strategy};
use super::{ScrapeContext, SourceScraper, Transport};
use crate::models::{Category, Event};

const EVENTS_INDEX: &str = "https://lavarla.com/etkinlik/";

const LISTINGS: &[Listing] = &[Listing {
    url: "https://lavarla.com/ajde_events-sitemap.xml",
    category: CategoryRule::Fixed(Category::General),
    label: "sitemap",
}];

static PROFILE: SiteProfile = SiteProfile {
    id: "lavarla",
    name: "Lavarla",
    home_url: "https://lavarla.com",
    transport: Transport::Http,
    listings: LISTINGS,
    links: LinkRules {
        markers: &["lavarla.com/"],
        exclude: &["/page/"],
        cards: None,
    },
    detail_cap: 15,
    scrolls: 0,
};

const CHAINS: DetailChains = DetailChains {
    title: &[
        Strategy::Text(".evcal_event_title"),
        Strategy::Meta("og:title"),
        Strategy::PageTitle,
    ],
    start: &[Strategy::ItemProp("startDate")],
    end: &[Strategy::ItemProp("endDate")],
    venue: &[
        Strategy::Text(".event_location_name"),
        Strategy::Text(".evo_location_name"),
        Strategy::Meta("og:site_name"),
    ],
    address: &[Strategy::Text(".evo_location_address")],
    description: &[Strategy::Html(".eventon_desc_in"), Strategy::Meta("og:description")],
    image: &[
        Strategy::ItemProp("image"),
        Strategy::Attr(".evocard_main_image", "data-f"),
    ],
    price: &[
        Strategy::Text(".evotx_price"),
        Strategy::ItemProp("price"),
        Strategy::JsonLd("offers.price"),
    ],
    rules: &[],
    tickets: &[],
};

static LOC_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("loc").expect("lavarla sitemap loc"));

pub struct Lavarla;

impl ProfiledSite for Lavarla {
    fn profile(&self) -> &'static SiteProfile {
        &PROFILE
    }

    fn parse_detail(&self, html: &str, ctx: &DetailContext<'_>) -> EventDraft {
        let document = Html::parse_document(html);
        CHAINS.extract(&document, ctx.today)
    }

    // The "listing" is an XML sitemap; every <loc> is a detail page.
    fn detail_links(&self, xml: &str, _listing: &Listing) -> Vec<String> {
        let document = Html::parse_document(xml);
        let mut seen = HashSet::new();
        document
            .select(&LOC_SELECTOR)
            .map(|loc| loc.text().collect::<String>().trim().to_string())
            .filter(|url| url.starts_with("http"))
            .filter(|url| url != EVENTS_INDEX && !url.contains("/page/"))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

impl SourceScraper for Lavarla {
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
