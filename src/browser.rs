//! Headless browser sessions.
//!
//! A chain scrape opens one session, renders one or two pages with it and
//! closes it again. Sessions are never pooled; [`render_once`] is the only
//! entry point the scrapers use and it closes the session on every path.

use crate::ScrapeSettings;
use crate::error::BrowserError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Upper bound on waiting for `document.readyState == "complete"`.
const READY_POLL_ATTEMPTS: usize = 20;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Something to do on a page after it has loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Click the first element matching `selector`. When `required` is false
    /// a missing element is logged and ignored.
    Click { selector: String, required: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub url: String,
    pub interactions: Vec<Interaction>,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interactions: Vec::new(),
        }
    }

    pub fn click(mut self, selector: impl Into<String>, required: bool) -> Self {
        self.interactions.push(Interaction::Click {
            selector: selector.into(),
            required,
        });
        self
    }
}

/// Opens disposable browser sessions.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn open(&self, settings: &ScrapeSettings) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[async_trait::async_trait]
pub trait BrowserSession: Send {
    /// Navigate, wait for the page to load and settle, run the interactions
    /// and return the resulting DOM as HTML.
    async fn render(
        &mut self,
        request: &RenderRequest,
        settings: &ScrapeSettings,
    ) -> Result<String, BrowserError>;

    async fn close(self: Box<Self>);
}

/// Open a session, render `request`, close the session.
pub async fn render_once(
    renderer: &dyn PageRenderer,
    request: &RenderRequest,
    settings: &ScrapeSettings,
) -> Result<String, BrowserError> {
    let mut session = renderer.open(settings).await?;
    let result = session.render(request, settings).await;
    session.close().await;
    result
}

/// Launches a fresh Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer {
    chrome_path: Option<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }
}

#[async_trait::async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn open(&self, settings: &ScrapeSettings) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(settings.nav_timeout)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .arg(format!("--user-agent={}", settings.user_agent));
        if let Some(ref path) = self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler error");
                }
            }
        });
        debug!("browser session opened");

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            handler,
        }))
    }
}

struct ChromiumSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    async fn load(&self, browser: &Browser, url: &str) -> Result<chromiumoxide::Page, BrowserError> {
        let nav_err = |e: chromiumoxide::error::CdpError| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let page = browser.new_page(url).await.map_err(nav_err)?;
        page.wait_for_navigation().await.map_err(nav_err)?;

        // No network-idle wait: a complete readyState followed by the
        // settle delay in `render` stands in for it.
        for _ in 0..READY_POLL_ATTEMPTS {
            let state = page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|r| r.into_value::<String>().ok());
            if state.as_deref() == Some("complete") {
                break;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        Ok(page)
    }
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    async fn render(
        &mut self,
        request: &RenderRequest,
        settings: &ScrapeSettings,
    ) -> Result<String, BrowserError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| BrowserError::Launch("session already closed".to_string()))?;

        let page = tokio::time::timeout(settings.nav_timeout, self.load(browser, &request.url))
            .await
            .map_err(|_| BrowserError::Timeout {
                url: request.url.clone(),
                timeout: settings.nav_timeout,
            })??;

        // Listing pages keep hydrating after the load event.
        tokio::time::sleep(settings.settle_delay).await;

        for interaction in &request.interactions {
            let Interaction::Click { selector, required } = interaction;
            let clicked = match page.find_element(selector.as_str()).await {
                Ok(el) => el.click().await.map(|_| ()),
                Err(e) => Err(e),
            };
            match clicked {
                Ok(()) => tokio::time::sleep(settings.settle_delay).await,
                Err(e) if *required => {
                    let _ = page.close().await;
                    return Err(BrowserError::Interaction {
                        selector: selector.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => debug!(selector = %selector, error = %e, "optional click skipped"),
            }
        }

        let html = page
            .content()
            .await
            .map_err(|e| BrowserError::Content(e.to_string()));
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed");
        }
        html
    }

    async fn close(mut self: Box<Self>) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "failed to close browser");
            }
            if let Err(e) = browser.wait().await {
                warn!(error = %e, "failed to reap browser process");
            }
        }
        self.handler.abort();
        debug!("browser session closed");
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Reached without `close` only on panic or cancellation; dropping the
        // `Browser` kills the child process.
        self.handler.abort();
    }
}

/// Serves pre-rendered HTML keyed by URL. Used for saved page snapshots and
/// in tests; counts sessions so callers can check none are leaked.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRenderer {
    pages: Arc<Mutex<HashMap<String, String>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    rendered: Arc<Mutex<Vec<RenderRequest>>>,
}

impl SnapshotRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.lock().insert(url.into(), html.into());
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every request rendered so far, in order.
    pub fn requests(&self) -> Vec<RenderRequest> {
        self.rendered.lock().clone()
    }
}

#[async_trait::async_trait]
impl PageRenderer for SnapshotRenderer {
    async fn open(&self, _settings: &ScrapeSettings) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SnapshotSession {
            renderer: self.clone(),
        }))
    }
}

struct SnapshotSession {
    renderer: SnapshotRenderer,
}

#[async_trait::async_trait]
impl BrowserSession for SnapshotSession {
    async fn render(
        &mut self,
        request: &RenderRequest,
        _settings: &ScrapeSettings,
    ) -> Result<String, BrowserError> {
        self.renderer.rendered.lock().push(request.clone());
        self.renderer
            .pages
            .lock()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| BrowserError::Navigation {
                url: request.url.clone(),
                reason: "no snapshot for url".to_string(),
            })
    }

    async fn close(self: Box<Self>) {
        self.renderer.closed.fetch_add(1, Ordering::SeqCst);
    }
}
