use anyhow::{bail, Result};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::base;
use super::extract::{collect_detail_links, EventDraft, LinkRules};
use super::{ScrapeContext, Transport};
use crate::models::{Category, Event};
use crate::normalize;

/// Static description of one ticketing site.
#[derive(Debug)]
pub struct SiteProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub home_url: &'static str,
    pub transport: Transport,
    pub listings: &'static [Listing],
    pub links: LinkRules,
    /// Detail pages visited per listing.
    pub detail_cap: usize,
    pub scrolls: u32,
}

#[derive(Debug)]
pub struct Listing {
    pub url: &'static str,
    pub category: CategoryRule,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRule {
    Fixed(Category),
    /// Keyword detection over the extracted title and description.
    Detect,
}

impl CategoryRule {
    pub fn pick(&self, draft: &EventDraft) -> Category {
        match self {
            CategoryRule::Fixed(category) => *category,
            CategoryRule::Detect => {
                let title = draft.title.clone().into_option().unwrap_or_default();
                let description = draft.description.clone().into_option().unwrap_or_default();
                normalize::detect_category(&title, &description)
            }
        }
    }
}

pub struct DetailContext<'a> {
    pub listing: &'a Listing,
    pub url: &'a str,
    pub today: NaiveDate,
}

pub trait ProfiledSite: Send + Sync {
    fn profile(&self) -> &'static SiteProfile;

    fn parse_detail(&self, html: &str, ctx: &DetailContext<'_>) -> EventDraft;

    fn detail_links(&self, html: &str, listing: &Listing) -> Vec<String> {
        collect_detail_links(html, listing.url, &self.profile().links)
    }
}

/// Listing pages → candidate links → detail pages → events, one page at a time.
///
/// Listing and detail failures are logged and skipped. Fatal transport errors,
/// cancellation, or every listing failing make the whole source fail.
pub fn crawl_site<S>(site: &S, ctx: &mut ScrapeContext<'_>) -> Result<Vec<Event>>
where
    S: ProfiledSite + ?Sized,
{
    let profile = site.profile();
    let mut events = Vec::new();
    let mut failed_listings = 0usize;

    for (index, listing) in profile.listings.iter().enumerate() {
        ctx.cancel.check()?;
        if index > 0 {
            base::pause(ctx.pacing.listing_delay);
        }

        let html = match ctx.pages(profile.transport).listing(listing.url, profile.scrolls) {
            Ok(html) => html,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                warn!(source = profile.id, listing = listing.label, "listing failed: {err}");
                failed_listings += 1;
                continue;
            }
        };

        let links: Vec<String> = site
            .detail_links(&html, listing)
            .into_iter()
            .filter(|url| !ctx.seen.contains(url))
            .take(profile.detail_cap)
            .collect();
        info!(
            source = profile.id,
            listing = listing.label,
            candidates = links.len(),
            "collected detail links"
        );

        for url in links {
            ctx.cancel.check()?;
            if !ctx.seen.insert(url.clone()) {
                continue;
            }

            let loaded = ctx.pages(profile.transport).detail(&url);
            base::pause(ctx.pacing.detail_delay);
            let html = match loaded {
                Ok(html) => html,
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    warn!(source = profile.id, url = %url, "detail failed: {err}");
                    continue;
                }
            };

            let detail = DetailContext {
                listing,
                url: &url,
                today: ctx.today,
            };
            let draft = site.parse_detail(&html, &detail);
            let category = listing.category.pick(&draft);
            match draft.resolve(&url, category) {
                Ok(event) => events.push(event),
                Err(reason) => debug!(source = profile.id, url = %url, "dropped detail: {reason}"),
            }
        }
    }

    if !profile.listings.is_empty() && failed_listings == profile.listings.len() {
        bail!("all {failed_listings} listing pages of {} failed to load", profile.id);
    }

    info!(source = profile.id, events = events.len(), "crawl finished");
    Ok(events)
}
