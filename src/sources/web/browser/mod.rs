
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const READY_STATE_SCRIPT: &str = "document.readyState";
const BODY_TEXT_LENGTH_SCRIPT: &str =
    "document.body ? document.body.innerText.trim().length : 0";

/// Configuration for the headless browser used to render web pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Whether to run Chrome without a window
    pub headless: bool,
    /// Upper bound for loading and rendering one page
    pub timeout_seconds: u64,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Rendered body text must be longer than this before the page counts as loaded
    pub min_text_length: usize,
    /// Pause after the page is ready, for late scripts
    pub settle_millis: u64,
    /// Additional Chrome arguments
    pub chrome_args: Vec<String>,
}

impl Default for BrowserConfig {
    #[inline]
    fn default() -> Self {
        Self {
            headless: true,
            timeout_seconds: 20,
            window_width: 1280,
            window_height: 720,
            min_text_length: 20,
            settle_millis: 1000,
            chrome_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--disable-extensions".to_string(),
            ],
        }
    }
}

impl BrowserConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Why a page could not be rendered
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Could not start the browser: {0}")]
    Launch(String),
    #[error("Page not found or unreachable: {0}")]
    NotFound(String),
    #[error("Timed out after {seconds}s waiting for {url} to render")]
    Timeout { url: String, seconds: u64 },
    #[error("Browser crashed while rendering: {0}")]
    Crash(String),
}

/// A page loaded in a live browser. Dropping it releases the browser.
pub trait RenderedPage {
    fn url(&self) -> &Url;

    /// Full HTML of the rendered document
    fn html(&self) -> Result<String, RenderError>;
}

/// Opens URLs in a browser and waits for them to finish rendering
pub trait PageRenderer {
    fn open(&self, url: &Url) -> Result<Box<dyn RenderedPage>, RenderError>;
}

/// Renders pages with a local Chrome or Chromium through the DevTools protocol
#[derive(Debug, Clone, Default)]
pub struct ChromeRenderer {
    config: BrowserConfig,
}

impl ChromeRenderer {
    #[inline]
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn launch(&self) -> Result<Browser, RenderError> {
        let args: Vec<&OsStr> = self.config.chrome_args.iter().map(OsStr::new).collect();
        let launch_options = LaunchOptions {
            headless: self.config.headless,
            window_size: Some((self.config.window_width, self.config.window_height)),
            args,
            idle_browser_timeout: self.config.timeout() + Duration::from_secs(30),
            ..Default::default()
        };

        Browser::new(launch_options).map_err(|e| RenderError::Launch(format!("{e:#}")))
    }

    /// Navigate and block until the page is ready, has enough text and has settled
    fn load(&self, tab: &Tab, url: &Url) -> Result<(), RenderError> {
        let deadline = Instant::now() + self.config.timeout();
        let timeout_error = || RenderError::Timeout {
            url: url.to_string(),
            seconds: self.config.timeout_seconds,
        };

        tab.set_default_timeout(self.config.timeout());
        tab.navigate_to(url.as_str())
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| {
                let message = format!("{e:#}");
                if message.to_ascii_lowercase().contains("timeout") {
                    timeout_error()
                } else {
                    RenderError::NotFound(format!("{url}: {message}"))
                }
            })?;

        loop {
            let ready = evaluate(tab, READY_STATE_SCRIPT)?
                .as_str()
                .is_some_and(|state| state == "complete");
            let text_length = evaluate(tab, BODY_TEXT_LENGTH_SCRIPT)?
                .as_u64()
                .unwrap_or_default();

            if ready && text_length > self.config.min_text_length as u64 {
                debug!("{} ready with {} characters of text", url, text_length);
                break;
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                warn!(
                    "{} not ready before timeout (readyState complete: {}, text length: {})",
                    url, ready, text_length
                );
                return Err(timeout_error());
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        std::thread::sleep(Duration::from_millis(self.config.settle_millis));
        Ok(())
    }
}

fn evaluate(tab: &Tab, script: &str) -> Result<serde_json::Value, RenderError> {
    tab.evaluate(script, false)
        .map(|result| result.value.unwrap_or(serde_json::Value::Null))
        .map_err(|e| RenderError::Crash(format!("{e:#}")))
}

impl PageRenderer for ChromeRenderer {
    #[inline]
    fn open(&self, url: &Url) -> Result<Box<dyn RenderedPage>, RenderError> {
        let start_time = Instant::now();
        let browser = self.launch()?;
        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Crash(format!("{e:#}")))?;

        // `browser` is dropped on the error path, which terminates Chrome
        self.load(&tab, url)?;

        info!("Rendered {} in {:?}", url, start_time.elapsed());
        Ok(Box::new(ChromePage {
            url: url.clone(),
            tab,
            _browser: browser,
        }))
    }
}

/// A rendered page that owns its Chrome process
struct ChromePage {
    url: Url,
    tab: Arc<Tab>,
    _browser: Browser,
}

impl RenderedPage for ChromePage {
    fn url(&self) -> &Url {
        &self.url
    }

    fn html(&self) -> Result<String, RenderError> {
        let content = self
            .tab
            .get_content()
            .map_err(|e| RenderError::Crash(format!("{e:#}")))?;
        debug!("Read {} bytes of rendered HTML from {}", content.len(), self.url);
        Ok(content)
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!("Tab for {} was already gone: {}", self.url, e);
        }
        debug!("Released browser for {}", self.url);
    }
}
