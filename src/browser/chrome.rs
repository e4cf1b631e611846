use super::scripts;
use crate::core::config::BrowserConfig;
use crate::core::{PageDriver, Query};
use crate::errors::{Result, ScrapeError};
use crate::types::{ElementInfo, NodeHandle};
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// [`PageDriver`] over a single tab of a locally launched Chrome.
pub struct ChromeDriver {
    // Dropping the browser kills the process; keep it alive with the tab.
    _browser: Browser,
    tab: Arc<Tab>,
    stealth: bool,
}

impl ChromeDriver {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!("--window-size={},{}", config.viewport.width, config.viewport.height);
        let user_agent_arg = config.user_agent.as_ref().map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];
        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }
        if config.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }
        if config.stealth {
            args.push(OsStr::new("--disable-blink-features=AutomationControlled"));
        }
        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .idle_browser_timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;
        let tab = browser.new_tab().map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;
        tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

        info!("Chrome launched (headless: {})", config.headless);
        Ok(Self {
            _browser: browser,
            tab,
            stealth: config.stealth,
        })
    }

    /// Evaluate a snippet from [`scripts`] and unwrap its `{ ok | error }`
    /// envelope.
    fn run(&self, script: &str) -> Result<Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;
        let raw = result
            .value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::JavaScriptFailed("script returned no value".into()))?;
        let mut envelope: Value = serde_json::from_str(raw)?;

        if let Some(error) = envelope.get("error").and_then(Value::as_str) {
            if let Some(id) = error.strip_prefix("stale:").and_then(|id| id.parse().ok()) {
                return Err(ScrapeError::StaleHandle(id));
            }
            return Err(ScrapeError::JavaScriptFailed(error.to_string()));
        }
        Ok(envelope.get_mut("ok").map(Value::take).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| ScrapeError::NavigationFailed(e.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| ScrapeError::NavigationFailed(e.to_string()))?;

        if self.stealth {
            if let Err(e) = self.tab.evaluate(scripts::HIDE_WEBDRIVER, false) {
                debug!("webdriver override failed: {}", e);
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn query(&self, scope: Option<NodeHandle>, query: &Query) -> Result<Vec<NodeHandle>> {
        let value = self.run(&scripts::query(scope, query)).map_err(|e| match e {
            ScrapeError::JavaScriptFailed(msg) => ScrapeError::QueryFailed(format!("{}: {}", query, msg)),
            other => other,
        })?;
        let ids: Vec<u64> = serde_json::from_value(value)?;
        Ok(ids.into_iter().map(NodeHandle::new).collect())
    }

    async fn inspect(&self, node: NodeHandle) -> Result<ElementInfo> {
        let value = self.run(&scripts::inspect(node))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn inner_html(&self, node: NodeHandle) -> Result<String> {
        let value = self.run(&scripts::inner_html(node))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn scroll_into_view(&self, node: NodeHandle) -> Result<()> {
        self.run(&scripts::scroll_into_view(node))?;
        Ok(())
    }

    async fn click(&self, node: NodeHandle) -> Result<()> {
        let hit = self.run(&scripts::hit_test(node))?;
        if !hit.get("clear").and_then(Value::as_bool).unwrap_or(false) {
            let blocker = hit.get("blocker").and_then(Value::as_str).unwrap_or("nothing");
            return Err(ScrapeError::ActionRejected(format!("{} is covered by {}", node, blocker)));
        }
        let point = Point {
            x: hit.get("x").and_then(Value::as_f64).unwrap_or_default(),
            y: hit.get("y").and_then(Value::as_f64).unwrap_or_default(),
        };
        self.tab
            .click_point(point)
            .map_err(|e| ScrapeError::ActionRejected(e.to_string()))?;
        Ok(())
    }

    async fn click_programmatic(&self, node: NodeHandle) -> Result<()> {
        self.run(&scripts::click_programmatic(node))?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.tab
            .press_key(key)
            .map_err(|e| ScrapeError::ActionRejected(e.to_string()))?;
        Ok(())
    }

    async fn scroll_to(&self, y: f64) -> Result<()> {
        self.run(&scripts::scroll_to(y))?;
        Ok(())
    }

    async fn page_height(&self) -> Result<f64> {
        Ok(self.run(&scripts::page_height())?.as_f64().unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| ScrapeError::ScreenshotFailed(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.tab.close(true)?;
        info!("Browser session closed");
        Ok(())
    }
}
