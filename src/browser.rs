use std::{
    ffi::OsStr,
    path::PathBuf,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::pages::{PageError, PageSource};

const LAUNCH_ARGS: [&str; 7] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-networking",
    "--no-first-run",
    "--no-default-browser-check",
];

// Consent banners, newsletter modals and app-install prompts seen on the ticketing sites.
const OVERLAY_SELECTORS: [&str; 18] = [
    "#onetrust-accept-btn-handler",
    ".cc-btn.cc-dismiss",
    ".cc-allow",
    "[id*='cookie'] button",
    "[class*='cookie'] button",
    "[class*='kabul']",
    "[id*='kabul']",
    "button[aria-label='Close']",
    "button[aria-label='Kapat']",
    ".modal-close",
    ".close-modal",
    ".bx-close",
    ".bx-popup-close",
    ".passo-popup-close",
    "[class*='newsletter'] .close",
    "[class*='notification'] .close",
    "[class*='gdpr'] button",
    "[class*='kvkk'] button",
];

const OVERLAY_BUTTON_TEXTS: [&str; 7] = [
    "Kabul Et",
    "Kabul Ediyorum",
    "Tamam",
    "Anladım",
    "Kapat",
    "Devam",
    "Onayla",
];

const STATUS_SCRIPT: &str = "(() => { const nav = performance.getEntriesByType('navigation')[0]; return nav && nav.responseStatus ? nav.responseStatus : 0; })()";
const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight); true";
const OVERLAY_SETTLE: Duration = Duration::from_millis(300);

static OVERLAY_SCRIPT: Lazy<String> = Lazy::new(overlay_script);

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub sandbox: bool,
    pub chrome_path: Option<PathBuf>,
    pub user_agent: String,
    pub accept_language: String,
    pub viewport: (u32, u32),
    pub navigation_timeout: Duration,
    /// How long Chrome may sit unused, e.g. while HTTP sources run.
    pub idle_timeout: Duration,
    pub scroll_wait: Duration,
    pub overlay_passes: u32,
}

impl BrowserOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            headless: config.headless,
            sandbox: config.sandbox,
            chrome_path: config.chrome_path.clone(),
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            viewport: (config.viewport_width, config.viewport_height),
            navigation_timeout: config.navigation_timeout(),
            idle_timeout: config
                .run_timeout()
                .max(config.navigation_timeout() + Duration::from_secs(60)),
            scroll_wait: Duration::from_millis(config.scroll_wait_ms),
            overlay_passes: config.overlay_passes,
        }
    }
}

/// One headless Chrome per run, launched lazily and released exactly once.
pub struct BrowserSession {
    options: BrowserOptions,
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    kill: KillSwitch,
}

impl BrowserSession {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            browser: None,
            tab: None,
            kill: KillSwitch::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    pub fn acquire(&mut self) -> Result<&Browser, PageError> {
        if self.browser.is_none() {
            let browser = self.launch()?;
            self.kill.arm(browser.get_process_id());
            info!(pid = ?browser.get_process_id(), headless = self.options.headless, "browser launched");
            self.browser = Some(browser);
        }
        self.browser
            .as_ref()
            .ok_or_else(|| PageError::Launch("browser unavailable".to_string()))
    }

    fn launch(&self) -> Result<Browser, PageError> {
        let args: Vec<&OsStr> = LAUNCH_ARGS.iter().map(OsStr::new).collect();
        let launch_options = LaunchOptions::default_builder()
            .headless(self.options.headless)
            .sandbox(self.options.sandbox)
            .window_size(Some(self.options.viewport))
            .path(self.options.chrome_path.clone())
            .idle_browser_timeout(self.options.idle_timeout)
            .args(args)
            .build()
            .map_err(|err| PageError::Launch(err.to_string()))?;
        Browser::new(launch_options).map_err(|err| PageError::Launch(format!("{err:#}")))
    }

    fn tab(&mut self) -> Result<Arc<Tab>, PageError> {
        if let Some(tab) = &self.tab {
            return Ok(Arc::clone(tab));
        }
        let tab = match self.open_tab() {
            Ok(tab) => tab,
            Err(err) => {
                warn!("{err}; relaunching browser");
                self.shut_down();
                self.open_tab()?
            }
        };
        tab.set_default_timeout(self.options.navigation_timeout);
        if let Err(err) = tab.set_user_agent(
            &self.options.user_agent,
            Some(&self.options.accept_language),
            None,
        ) {
            warn!("failed to set user agent: {err:#}");
        }
        self.tab = Some(Arc::clone(&tab));
        Ok(tab)
    }

    fn open_tab(&mut self) -> Result<Arc<Tab>, PageError> {
        self.acquire()?
            .new_tab()
            .map_err(|err| PageError::Launch(format!("unable to open tab: {err:#}")))
    }

    fn discard_tab(&mut self) {
        if let Some(tab) = self.tab.take() {
            if let Err(err) = tab.close(false) {
                debug!("closing failed tab: {err:#}");
            }
        }
    }

    pub fn navigate(&mut self, url: &str) -> Result<Arc<Tab>, PageError> {
        let tab = self.tab()?;
        let outcome = tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ());
        if let Err(err) = outcome {
            self.discard_tab();
            return Err(classify_failure(url, &format!("{err:#}")));
        }

        let status = document_status(&tab);
        if !is_success_status(status) {
            return Err(PageError::Status {
                url: url.to_string(),
                status,
            });
        }

        self.dismiss_on(&tab);
        Ok(tab)
    }

    pub fn dismiss_overlays(&mut self) {
        if let Some(tab) = self.tab.clone() {
            self.dismiss_on(&tab);
        }
    }

    fn dismiss_on(&self, tab: &Tab) {
        for pass in 0..self.options.overlay_passes {
            let clicked = match tab.evaluate(&OVERLAY_SCRIPT, false) {
                Ok(result) => result.value.and_then(|v| v.as_u64()).unwrap_or(0),
                Err(err) => {
                    debug!(pass, "overlay dismissal failed: {err:#}");
                    0
                }
            };
            if clicked == 0 {
                break;
            }
            debug!(pass, clicked, "dismissed overlays");
            thread::sleep(OVERLAY_SETTLE);
        }
    }

    pub fn scroll_and_wait(&mut self, iterations: u32) {
        let Some(tab) = self.tab.clone() else {
            return;
        };
        for step in 0..iterations {
            if let Err(err) = tab.evaluate(SCROLL_SCRIPT, false) {
                debug!(step, "scroll failed: {err:#}");
                break;
            }
            thread::sleep(self.options.scroll_wait);
            self.dismiss_on(&tab);
        }
    }

    fn content(&mut self, url: &str, tab: &Tab) -> Result<String, PageError> {
        tab.get_content().map_err(|err| {
            let failure = classify_failure(url, &format!("{err:#}"));
            self.discard_tab();
            failure
        })
    }

    pub fn release(&mut self) {
        if self.shut_down() {
            info!("browser released");
        }
    }

    fn shut_down(&mut self) -> bool {
        self.discard_tab();
        let running = self.browser.take().is_some();
        self.kill.disarm();
        running
    }
}

impl PageSource for BrowserSession {
    fn listing(&mut self, url: &str, scrolls: u32) -> Result<String, PageError> {
        let tab = self.navigate(url)?;
        self.scroll_and_wait(scrolls);
        self.content(url, &tab)
    }

    fn detail(&mut self, url: &str) -> Result<String, PageError> {
        let tab = self.navigate(url)?;
        self.content(url, &tab)
    }

    fn warm_up(&mut self) -> Result<(), PageError> {
        self.acquire().map(|_| ())
    }

    fn release(&mut self) {
        BrowserSession::release(self);
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Forcibly ends the browser process from another thread.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(Arc<Mutex<Option<u32>>>);

impl KillSwitch {
    fn arm(&self, pid: Option<u32>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = pid;
        }
    }

    fn disarm(&self) {
        self.arm(None);
    }

    /// Returns true when a live process was signalled.
    pub fn terminate(&self) -> bool {
        let pid = match self.0.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(pid) = pid else {
            return false;
        };
        warn!(pid, "terminating browser process");
        terminate_process(pid)
    }
}

fn terminate_process(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    match system.process(pid) {
        Some(process) => process.kill(),
        None => {
            debug!(%pid, "browser process already gone");
            false
        }
    }
}

/// Navigation-timing status; 0 means the response was aborted or blocked.
fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}

fn document_status(tab: &Tab) -> u16 {
    tab.evaluate(STATUS_SCRIPT, false)
        .ok()
        .and_then(|result| result.value)
        .and_then(|value| value.as_u64())
        .and_then(|status| u16::try_from(status).ok())
        .unwrap_or(0)
}

fn classify_failure(url: &str, reason: &str) -> PageError {
    let lower = reason.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        PageError::Timeout(url.to_string())
    } else {
        PageError::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn overlay_script() -> String {
    let selectors = serde_json::to_string(&OVERLAY_SELECTORS).unwrap_or_else(|_| "[]".into());
    let texts = serde_json::to_string(&OVERLAY_BUTTON_TEXTS).unwrap_or_else(|_| "[]".into());
    format!(
        r#"(() => {{
  const selectors = {selectors};
  const texts = {texts};
  let clicked = 0;
  for (const selector of selectors) {{
    try {{
      document.querySelectorAll(selector).forEach((el) => {{
        if (el.offsetParent !== null) {{ el.click(); clicked++; }}
      }});
    }} catch (e) {{}}
  }}
  document.querySelectorAll('button, a, [role="button"]').forEach((el) => {{
    const label = (el.innerText || '').trim();
    if (texts.includes(label)) {{
      try {{ el.click(); clicked++; }} catch (e) {{}}
    }}
  }});
  return clicked;
}})()"#
    )
}
