pub mod base;
pub mod biletinial_browser;
pub mod biletix_browser;
pub mod bubilet_html;
pub mod crawl;
pub mod extract;
pub mod lavarla_sitemap;
pub mod passo_browser;

use std::{collections::HashSet, time::Duration};

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::AppConfig;
use crate::models::Event;
use crate::pages::{CancelToken, PageSource};

pub trait SourceScraper: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn source_name(&self) -> &'static str;
    fn source_url(&self) -> &'static str;
    fn transport(&self) -> Transport;
    fn scrape(&self, ctx: &mut ScrapeContext<'_>) -> anyhow::Result<Vec<Event>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Browser,
    Http,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pacing {
    pub detail_delay: Duration,
    pub listing_delay: Duration,
}

impl Pacing {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            detail_delay: Duration::from_millis(config.detail_delay_ms),
            listing_delay: Duration::from_millis(config.listing_delay_ms),
        }
    }
}

/// Per-run state handed to each scraper in turn.
pub struct ScrapeContext<'a> {
    pub browser: &'a mut dyn PageSource,
    pub http: &'a mut dyn PageSource,
    pub seen: &'a mut HashSet<String>,
    pub cancel: &'a CancelToken,
    pub pacing: Pacing,
    pub today: NaiveDate,
}

impl<'a> ScrapeContext<'a> {
    pub fn pages(&mut self, transport: Transport) -> &mut dyn PageSource {
        match transport {
            Transport::Browser => &mut *self.browser,
            Transport::Http => &mut *self.http,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ScraperInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub transport: Transport,
}

pub fn active_scrapers() -> Vec<Box<dyn SourceScraper>> {
    vec![
        Box::new(passo_browser::Passo),
        Box::new(biletix_browser::Biletix),
        Box::new(biletinial_browser::Biletinial),
        Box::new(bubilet_html::Bubilet),
        Box::new(lavarla_sitemap::Lavarla),
    ]
}

pub fn list_scrapers() -> Vec<ScraperInfo> {
    active_scrapers()
        .into_iter()
        .map(|scraper| ScraperInfo {
            id: scraper.source_id().to_string(),
            name: scraper.source_name().to_string(),
            url: scraper.source_url().to_string(),
            transport: scraper.transport(),
        })
        .collect()
}

pub fn find_scraper(id: &str) -> Option<Box<dyn SourceScraper>> {
    active_scrapers()
        .into_iter()
        .find(|scraper| scraper.source_id().eq_ignore_ascii_case(id.trim()))
}
