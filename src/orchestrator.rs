use std::{
    any::Any,
    collections::HashSet,
    panic::{self, AssertUnwindSafe},
    time::Duration,
};

use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::browser::{BrowserOptions, BrowserSession, KillSwitch};
use crate::config::AppConfig;
use crate::db::{RunLogOutcome, Store};
use crate::http::HttpFetcher;
use crate::models::RunStatus;
use crate::normalize::HOME_TIMEZONE;
use crate::pages::{CancelToken, PageError, PageSource};
use crate::scraping::{self, Pacing, ScrapeContext, SourceScraper, Transport};
use crate::sync;
use crate::utils;

/// How long a timed-out run gets to finish its bookkeeping after the kill.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),
    #[error("{scraper} hit a fatal error: {reason}")]
    Fatal { scraper: String, reason: String },
    #[error("run cancelled")]
    Cancelled,
    #[error("run exceeded its {0:?} deadline")]
    TimedOut(Duration),
    #[error("event store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("http client setup failed: {0}")]
    HttpSetup(String),
    #[error("unknown source {name:?}; available: {}", .available.join(", "))]
    UnknownSource {
        name: String,
        available: Vec<String>,
    },
    #[error("run worker stopped unexpectedly: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub status: RunStatus,
    pub scraped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunSummary {
    pub total_scraped: usize,
    pub sources: Vec<SourceReport>,
    /// Most recent error messages, oldest first.
    pub errors: Vec<String>,
}

pub struct Orchestrator {
    scrapers: Vec<Box<dyn SourceScraper>>,
    pacing: Pacing,
    error_tail: usize,
    today: NaiveDate,
}

impl Orchestrator {
    pub fn new(scrapers: Vec<Box<dyn SourceScraper>>, config: &AppConfig) -> Self {
        Self {
            scrapers,
            pacing: Pacing::from_config(config),
            error_tail: config.error_tail,
            today: Utc::now().with_timezone(&HOME_TIMEZONE).date_naive(),
        }
    }

    /// Every registered source, or only the named ones in the given order.
    pub fn select(names: &[String], config: &AppConfig) -> Result<Self, RunError> {
        if names.is_empty() {
            return Ok(Self::new(scraping::active_scrapers(), config));
        }

        let mut picked: Vec<Box<dyn SourceScraper>> = Vec::new();
        for name in names {
            let scraper = scraping::find_scraper(name).ok_or_else(|| RunError::UnknownSource {
                name: name.clone(),
                available: scraping::list_scrapers().into_iter().map(|info| info.id).collect(),
            })?;
            if picked.iter().all(|p| p.source_id() != scraper.source_id()) {
                picked.push(scraper);
            }
        }
        Ok(Self::new(picked, config))
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn source_ids(&self) -> Vec<&'static str> {
        self.scrapers.iter().map(|s| s.source_id()).collect()
    }

    /// Runs the selected sources one after another, then releases the browser.
    pub fn run(
        &self,
        store: &Store,
        browser: &mut dyn PageSource,
        http: &mut dyn PageSource,
        cancel: &CancelToken,
    ) -> Result<RunSummary, RunError> {
        let result = self.run_sources(store, browser, http, cancel);
        browser.release();
        match &result {
            Ok(summary) => info!(
                sources = summary.sources.len(),
                scraped = summary.total_scraped,
                "run finished"
            ),
            Err(err) => error!("run aborted: {err}"),
        }
        result
    }

    fn run_sources(
        &self,
        store: &Store,
        browser: &mut dyn PageSource,
        http: &mut dyn PageSource,
        cancel: &CancelToken,
    ) -> Result<RunSummary, RunError> {
        let mut browser_ready = false;
        let mut seen = HashSet::new();
        let mut summary = RunSummary::default();
        let mut errors: Vec<String> = Vec::new();

        for scraper in &self.scrapers {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            let source = scraper.source_id();
            // Chrome starts with the first browser source, not with the run.
            if scraper.transport() == Transport::Browser && !browser_ready {
                browser
                    .warm_up()
                    .map_err(|err| RunError::BrowserLaunch(err.to_string()))?;
                browser_ready = true;
            }
            info!(source, "starting source");
            let log_id = store.start_run_log(source)?;

            let mut ctx = ScrapeContext {
                browser: &mut *browser,
                http: &mut *http,
                seen: &mut seen,
                cancel,
                pacing: self.pacing,
                today: self.today,
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| scraper.scrape(&mut ctx)));
            let (events, failure) = match outcome {
                Ok(Ok(events)) => (events, None),
                Ok(Err(err)) => (Vec::new(), Some(err)),
                Err(payload) => (
                    Vec::new(),
                    Some(anyhow!("scraper panicked: {}", panic_message(payload.as_ref()))),
                ),
            };

            let sync_report = sync::reconcile(store, &events, source);
            let error_message = failure.as_ref().map(|err| format!("{err:#}"));
            if let Some(message) = &error_message {
                error!(source, "source failed: {message}");
                errors.push(format!("{source}: {message}"));
            }
            errors.extend(sync_report.errors.iter().map(|e| format!("{source}: {e}")));

            let status = if failure.is_some() {
                RunStatus::Failed
            } else {
                RunStatus::Success
            };
            store.finish_run_log(
                log_id,
                &RunLogOutcome {
                    status,
                    events_count: events.len(),
                    new_count: sync_report.inserted,
                    updated_count: sync_report.updated,
                    error_message: error_message.clone(),
                },
            )?;
            info!(
                source,
                scraped = events.len(),
                inserted = sync_report.inserted,
                updated = sync_report.updated,
                failed = sync_report.failed,
                "source finished"
            );

            summary.total_scraped += events.len();
            summary.sources.push(SourceReport {
                source: source.to_string(),
                status,
                scraped: events.len(),
                inserted: sync_report.inserted,
                updated: sync_report.updated,
                failed: sync_report.failed,
                error: error_message,
            });

            if let Some(stop) = failure.as_ref().and_then(|err| stop_reason(source, err)) {
                return Err(stop);
            }
        }

        summary.errors = utils::tail(&errors, self.error_tail);
        Ok(summary)
    }
}

/// Errors that end the whole run rather than one source.
fn stop_reason(source: &str, err: &anyhow::Error) -> Option<RunError> {
    match err.downcast_ref::<PageError>()? {
        PageError::Cancelled => Some(RunError::Cancelled),
        fatal if fatal.is_fatal() => Some(RunError::Fatal {
            scraper: source.to_string(),
            reason: fatal.to_string(),
        }),
        _ => None,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs a full scrape on a blocking worker, bounded by `limit`.
pub async fn run_with_deadline(
    config: AppConfig,
    selection: Vec<String>,
    limit: Duration,
) -> Result<RunSummary, RunError> {
    let orchestrator = Orchestrator::select(&selection, &config)?;
    info!(sources = ?orchestrator.source_ids(), ?limit, "starting run");

    let mut browser = BrowserSession::new(BrowserOptions::from_config(&config));
    let kill = browser.kill_switch();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let db_path = config.database_path();

    with_deadline(limit, &cancel, &kill, move || {
        let store = Store::open(&db_path)?;
        let mut http =
            HttpFetcher::from_config(&config).map_err(|err| RunError::HttpSetup(err.to_string()))?;
        orchestrator.run(&store, &mut browser, &mut http, &worker_cancel)
    })
    .await
}

async fn with_deadline<F>(
    limit: Duration,
    cancel: &CancelToken,
    kill: &KillSwitch,
    job: F,
) -> Result<RunSummary, RunError>
where
    F: FnOnce() -> Result<RunSummary, RunError> + Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(job);
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(joined) => joined.map_err(|err| RunError::Worker(err.to_string()))?,
        Err(_) => {
            warn!(?limit, "run deadline reached, cancelling");
            cancel.cancel();
            if kill.terminate() {
                warn!("browser process killed");
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("run worker still busy after the grace period");
            }
            Err(RunError::TimedOut(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::db::tests::sample_event;
    use crate::models::Event;
    use crate::scraping::crawl::tests::FakePages;

    enum Behavior {
        Events(Vec<Event>),
        Fail,
        Panic,
        Fatal,
        Load(&'static str),
    }

    struct FakeScraper {
        id: &'static str,
        transport: Transport,
        behavior: Behavior,
    }

    impl SourceScraper for FakeScraper {
        fn source_id(&self) -> &'static str {
            self.id
        }

        fn source_name(&self) -> &'static str {
            self.id
        }

        fn source_url(&self) -> &'static str {
            "https://tickets.example"
        }

        fn transport(&self) -> Transport {
            self.transport
        }

        fn scrape(&self, ctx: &mut ScrapeContext<'_>) -> anyhow::Result<Vec<Event>> {
            match &self.behavior {
                Behavior::Events(events) => Ok(events.clone()),
                Behavior::Fail => Err(anyhow!("sitemap unreachable")),
                Behavior::Panic => panic!("selector exploded"),
                Behavior::Fatal => Err(PageError::Launch("browser crashed".into()).into()),
                Behavior::Load(url) => {
                    ctx.pages(self.transport).detail(url)?;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn fake(id: &'static str, transport: Transport, behavior: Behavior) -> Box<dyn SourceScraper> {
        Box::new(FakeScraper {
            id,
            transport,
            behavior,
        })
    }

    fn orchestrator(scrapers: Vec<Box<dyn SourceScraper>>) -> Orchestrator {
        let config = AppConfig {
            detail_delay_ms: 0,
            listing_delay_ms: 0,
            ..AppConfig::default()
        };
        Orchestrator::new(scrapers, &config)
            .with_today(NaiveDate::from_ymd_opt(2025, 11, 1).expect("date"))
    }

    #[test]
    fn failing_sources_do_not_stop_the_run() {
        let store = Store::open_in_memory().expect("store");
        let run = orchestrator(vec![
            fake("panics", Transport::Browser, Behavior::Panic),
            fake("fails", Transport::Http, Behavior::Fail),
            fake(
                "works",
                Transport::Http,
                Behavior::Events(vec![
                    sample_event("https://x.example/1", "A"),
                    sample_event("https://x.example/2", "B"),
                ]),
            ),
        ]);
        let mut browser = FakePages::default();
        let mut http = FakePages::default();

        let summary = run
            .run(&store, &mut browser, &mut http, &CancelToken::new())
            .expect("run");

        assert!(browser.warmed);
        assert_eq!(browser.released, 1);
        assert_eq!(summary.total_scraped, 2);
        let statuses: Vec<(&str, RunStatus)> = summary
            .sources
            .iter()
            .map(|s| (s.source.as_str(), s.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("panics", RunStatus::Failed),
                ("fails", RunStatus::Failed),
                ("works", RunStatus::Success),
            ]
        );
        assert!(summary.sources[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("selector exploded"));
        assert_eq!(summary.sources[2].inserted, 2);
        assert_eq!(store.count_events().expect("count"), 2);

        let logs = store.recent_logs(10).expect("logs");
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|log| log.finished_at.is_some()));
        assert_eq!(logs[0].scraper_name, "works");
        assert_eq!(logs[0].new_count, 2);
    }

    #[test]
    fn second_run_updates_instead_of_inserting() {
        let store = Store::open_in_memory().expect("store");
        let events = vec![sample_event("https://x.example/1", "A")];
        for expected_inserted in [1, 0] {
            let run = orchestrator(vec![fake("works", Transport::Http, Behavior::Events(events.clone()))]);
            let summary = run
                .run(&store, &mut FakePages::default(), &mut FakePages::default(), &CancelToken::new())
                .expect("run");
            assert_eq!(summary.sources[0].inserted, expected_inserted);
        }
        assert_eq!(store.count_events().expect("count"), 1);
    }

    #[test]
    fn browser_launch_failure_aborts_before_any_source() {
        let store = Store::open_in_memory().expect("store");
        let run = orchestrator(vec![fake("passo", Transport::Browser, Behavior::Events(Vec::new()))]);
        let mut browser = FakePages {
            fail_warm_up: true,
            ..FakePages::default()
        };

        let err = run
            .run(&store, &mut browser, &mut FakePages::default(), &CancelToken::new())
            .expect_err("launch must fail");
        assert!(matches!(err, RunError::BrowserLaunch(_)));
        assert_eq!(browser.released, 1);
        assert!(store.recent_logs(10).expect("logs").is_empty());
    }

    #[test]
    fn browser_starts_only_when_a_browser_source_comes_up() {
        let store = Store::open_in_memory().expect("store");
        let run = orchestrator(vec![
            fake("bubilet", Transport::Http, Behavior::Events(vec![sample_event("https://x.example/1", "A")])),
            fake("lavarla", Transport::Http, Behavior::Events(vec![sample_event("https://x.example/2", "B")])),
            fake("passo", Transport::Browser, Behavior::Events(Vec::new())),
        ]);
        let mut browser = FakePages {
            fail_warm_up: true,
            ..FakePages::default()
        };

        let err = run
            .run(&store, &mut browser, &mut FakePages::default(), &CancelToken::new())
            .expect_err("launch must fail");
        assert!(matches!(err, RunError::BrowserLaunch(_)));
        assert_eq!(store.count_events().expect("count"), 2);
        let logged: Vec<String> = store
            .recent_logs(10)
            .expect("logs")
            .into_iter()
            .map(|log| log.scraper_name)
            .collect();
        assert_eq!(logged, vec!["lavarla", "bubilet"]);
        assert_eq!(browser.released, 1);
    }

    #[test]
    fn http_only_runs_never_start_the_browser() {
        let store = Store::open_in_memory().expect("store");
        let run = orchestrator(vec![fake("lavarla", Transport::Http, Behavior::Events(Vec::new()))]);
        let mut browser = FakePages {
            fail_warm_up: true,
            ..FakePages::default()
        };
        run.run(&store, &mut browser, &mut FakePages::default(), &CancelToken::new())
            .expect("run");
        assert!(!browser.warmed);
    }

    #[test]
    fn fatal_errors_stop_remaining_sources() {
        let store = Store::open_in_memory().expect("store");
        let run = orchestrator(vec![
            fake("crashes", Transport::Browser, Behavior::Fatal),
            fake("never", Transport::Http, Behavior::Events(vec![sample_event("https://x.example/1", "A")])),
        ]);
        let mut browser = FakePages::default();
        let err = run
            .run(&store, &mut browser, &mut FakePages::default(), &CancelToken::new())
            .expect_err("fatal");

        assert!(matches!(err, RunError::Fatal { ref scraper, .. } if scraper == "crashes"));
        assert_eq!(browser.released, 1);
        assert_eq!(store.count_events().expect("count"), 0);
        let logs = store.recent_logs(10).expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, RunStatus::Failed);
    }

    #[test]
    fn transport_errors_from_a_source_are_local() {
        let store = Store::open_in_memory().expect("store");
        let run = orchestrator(vec![
            fake("missing", Transport::Http, Behavior::Load("https://x.example/404")),
            fake("works", Transport::Http, Behavior::Events(vec![sample_event("https://x.example/1", "A")])),
        ]);
        let summary = run
            .run(&store, &mut FakePages::default(), &mut FakePages::default(), &CancelToken::new())
            .expect("run");
        assert_eq!(summary.sources[0].status, RunStatus::Failed);
        assert_eq!(summary.sources[1].status, RunStatus::Success);
    }

    #[test]
    fn cancelled_runs_stop_and_release() {
        let store = Store::open_in_memory().expect("store");
        let run = orchestrator(vec![fake("works", Transport::Http, Behavior::Events(Vec::new()))]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut browser = FakePages::default();
        let err = run
            .run(&store, &mut browser, &mut FakePages::default(), &cancel)
            .expect_err("cancelled");
        assert!(matches!(err, RunError::Cancelled));
        assert_eq!(browser.released, 1);
    }

    #[test]
    fn error_tail_keeps_the_latest_messages() {
        let store = Store::open_in_memory().expect("store");
        let config = AppConfig {
            error_tail: 1,
            ..AppConfig::default()
        };
        let run = Orchestrator::new(
            vec![
                fake("first", Transport::Http, Behavior::Fail),
                fake("second", Transport::Http, Behavior::Fail),
            ],
            &config,
        );
        let summary = run
            .run(&store, &mut FakePages::default(), &mut FakePages::default(), &CancelToken::new())
            .expect("run");
        assert_eq!(summary.errors, vec!["second: sitemap unreachable".to_string()]);
    }

    #[test]
    fn selection_rejects_unknown_sources() {
        let config = AppConfig::default();
        let err = Orchestrator::select(&["eventbrite".to_string()], &config)
            .err()
            .expect("unknown source");
        let message = err.to_string();
        assert!(message.contains("eventbrite"));
        assert!(message.contains("passo, biletix, biletinial, bubilet, lavarla"));

        let picked = Orchestrator::select(
            &["Lavarla".to_string(), "passo".to_string(), "lavarla".to_string()],
            &config,
        )
        .expect("known sources");
        assert_eq!(picked.source_ids(), vec!["lavarla", "passo"]);

        let all = Orchestrator::select(&[], &config).expect("all sources");
        assert_eq!(all.source_ids().len(), 5);
    }

    #[tokio::test]
    async fn deadline_cancels_the_worker() {
        let cancel = CancelToken::new();
        let observed = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let worker_observed = observed.clone();

        let result = with_deadline(
            Duration::from_millis(50),
            &cancel,
            &KillSwitch::default(),
            move || {
                while !worker_cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                worker_observed.store(true, Ordering::SeqCst);
                Err(RunError::Cancelled)
            },
        )
        .await;

        assert!(matches!(result, Err(RunError::TimedOut(_))));
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn finished_work_beats_the_deadline() {
        let result = with_deadline(
            Duration::from_secs(5),
            &CancelToken::new(),
            &KillSwitch::default(),
            || Ok(RunSummary::default()),
        )
        .await;
        assert_eq!(result.expect("summary"), RunSummary::default());
    }
}
