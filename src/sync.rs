use serde::Serialize;
use tracing::{debug, warn};

use crate::db::Store;
use crate::models::Event;
use crate::normalize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

enum Outcome {
    Inserted,
    Updated,
}

/// Upserts each event by source URL. One failing row never blocks the rest.
pub fn reconcile(store: &Store, events: &[Event], source: &str) -> SyncReport {
    let mut report = SyncReport::default();
    for event in events {
        match upsert(store, event, source) {
            Ok(Outcome::Inserted) => report.inserted += 1,
            Ok(Outcome::Updated) => report.updated += 1,
            Err(err) => {
                warn!(source, url = %event.source_url, "failed to store event: {err}");
                report.failed += 1;
                report.errors.push(format!("{}: {err}", event.source_url));
            }
        }
    }
    debug!(
        source,
        inserted = report.inserted,
        updated = report.updated,
        failed = report.failed,
        "reconciled events"
    );
    report
}

fn upsert(store: &Store, event: &Event, source: &str) -> rusqlite::Result<Outcome> {
    let min_price = ticket_min_price(event);
    match store.find_by_source_url(&event.source_url)? {
        Some(existing) => {
            store.update_event(&existing.id, event, source, min_price)?;
            Ok(Outcome::Updated)
        }
        None => {
            let mut fresh = event.clone();
            fresh.is_approved = false;
            store.insert_event(&fresh, source, min_price)?;
            Ok(Outcome::Inserted)
        }
    }
}

/// Lowest parseable ticket price, if any line item has one.
pub fn ticket_min_price(event: &Event) -> Option<i64> {
    normalize::min_price(event.ticket_details.iter().map(|ticket| ticket.price.as_str()))
}
