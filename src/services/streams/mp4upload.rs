//! MP4Upload: the media source is only assigned by page script, so the
//! page is rendered in a headless browser and its inline scripts scanned.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use super::HostResolver;

lazy_static! {
    static ref PLAYER_SRC: Regex =
        Regex::new(r#"player\.src\(["'](https?://[^"']+\.mp4[^"']*)["']"#).unwrap();
}

/// Evaluated in the page: every inline script's text as a JSON string array
const SCRIPT_TEXTS_JS: &str =
    "JSON.stringify(Array.from(document.scripts).map(s => s.textContent || ''))";

/// First `player.src("<...mp4...>")` assignment across the given scripts
pub fn find_player_source(scripts: &[String]) -> Option<String> {
    scripts
        .iter()
        .find_map(|script| PLAYER_SRC.captures(script).map(|c| c[1].to_string()))
}

/// Source of inline script texts for a rendered page
#[async_trait]
pub trait PageScripts: Send + Sync {
    async fn script_texts(&self, url: &str) -> Result<Vec<String>>;
}

/// Headroom over the in-browser timeout for launch and teardown
const LAUNCH_HEADROOM: Duration = Duration::from_secs(10);

enum Slot<T> {
    Empty,
    Running(T),
    Cancelled,
}

/// Hand-off point for a running browser between the blocking worker and the
/// async caller. Dropping the browser kills its process, so whichever side
/// gives up first tears it down.
struct BrowserSlot<T>(Mutex<Slot<T>>);

impl<T> BrowserSlot<T> {
    fn new() -> Self {
        Self(Mutex::new(Slot::Empty))
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Park a launched browser. Returns false, dropping it, if the caller
    /// already gave up.
    fn park(&self, browser: T) -> bool {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Cancelled) {
            return false;
        }
        *slot = Slot::Running(browser);
        true
    }

    /// Take the browser back for an orderly teardown
    fn release(&self) -> Option<T> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Running(browser) => Some(browser),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Kill any parked browser and refuse later ones
    fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.lock(), Slot::Cancelled);
        drop(previous);
    }
}

/// Cancels the slot when the awaiting future is dropped or times out
struct CancelOnDrop<T>(Arc<BrowserSlot<T>>);

impl<T> Drop for CancelOnDrop<T> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Renders pages in a fresh headless Chrome per call
pub struct HeadlessChrome {
    user_agent: String,
    timeout: Duration,
}

impl HeadlessChrome {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PageScripts for HeadlessChrome {
    async fn script_texts(&self, url: &str) -> Result<Vec<String>> {
        let user_agent = self.user_agent.clone();
        let url = url.to_string();
        let timeout = self.timeout;

        let slot: Arc<BrowserSlot<Browser>> = Arc::new(BrowserSlot::new());
        let _teardown = CancelOnDrop(slot.clone());
        let worker_slot = slot.clone();
        let mut worker = tokio::task::spawn_blocking(move || {
            collect_scripts(&user_agent, &url, timeout, &worker_slot)
        });

        match tokio::time::timeout(timeout + LAUNCH_HEADROOM, &mut worker).await {
            Ok(joined) => joined.context("browser task panicked")?,
            Err(_) => {
                // pending browser calls fail once the process is gone
                slot.cancel();
                let _ = worker.await;
                Err(anyhow!("browser gave no result within {:?}", timeout + LAUNCH_HEADROOM))
            }
        }
    }
}

/// Launch, render, collect, and always tear the browser down
fn collect_scripts(
    user_agent: &str,
    url: &str,
    timeout: Duration,
    slot: &BrowserSlot<Browser>,
) -> Result<Vec<String>> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .idle_browser_timeout(timeout)
        .build()
        .map_err(|e| anyhow!("invalid launch options: {}", e))?;

    let browser = Browser::new(options)?;
    let tab = browser.new_tab()?;
    if !slot.park(browser) {
        return Err(anyhow!("browser cancelled before navigation"));
    }

    let scripts = scripts_in_tab(&tab, user_agent, url, timeout);
    if let Err(e) = tab.close(true) {
        debug!("Failed to close tab: {}", e);
    }
    drop(tab);
    drop(slot.release());
    scripts
}

fn scripts_in_tab(
    tab: &Tab,
    user_agent: &str,
    url: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    tab.set_default_timeout(timeout);
    tab.set_user_agent(user_agent, None, None)?;
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;

    let value = tab
        .evaluate(SCRIPT_TEXTS_JS, false)?
        .value
        .ok_or_else(|| anyhow!("script evaluation returned nothing"))?;
    let json = value
        .as_str()
        .ok_or_else(|| anyhow!("script evaluation returned a non-string"))?;

    Ok(serde_json::from_str(json)?)
}

pub struct Mp4UploadResolver {
    scripts: Arc<dyn PageScripts>,
}

impl Mp4UploadResolver {
    pub fn new(scripts: Arc<dyn PageScripts>) -> Self {
        Self { scripts }
    }
}

#[async_trait]
impl HostResolver for Mp4UploadResolver {
    fn name(&self) -> &str {
        "MP4UPLOAD"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.contains("mp4upload.com")
    }

    async fn resolve(&self, link: &str, _referer: &str) -> Option<String> {
        match self.scripts.script_texts(link).await {
            Ok(scripts) => find_player_source(&scripts),
            Err(e) => {
                warn!("MP4Upload resolve error for {}: {}", link, e);
                None
            }
        }
    }
}
