use crate::errors::{Result, ScrapeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub timing: TimingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    /// Hide the usual automation fingerprints (`navigator.webdriver`,
    /// the AutomationControlled blink feature).
    pub stealth: bool,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

/// Every delay and retry interval the engine uses.
///
/// The defaults were tuned against one configurator site; none of them carry
/// meaning beyond "long enough for that site's animations".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub scroll_settle_ms: u64,
    pub click_settle_ms: u64,
    pub escape_settle_ms: u64,
    pub dismiss_retry_wait_ms: u64,
    pub navigation_settle_ms: u64,
    pub wait_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub scroll_step_px: u32,
    pub scroll_step_delay_ms: u64,
    /// Random extra delay `[min, max]` added to settle waits.
    pub jitter_ms: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub screenshots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            viewport: Viewport::default(),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                    .to_string(),
            ),
            disable_images: false,
            stealth: true,
            args: vec![],
            timeout_ms: 30000,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            scroll_settle_ms: 300,
            click_settle_ms: 1000,
            escape_settle_ms: 500,
            dismiss_retry_wait_ms: 1000,
            navigation_settle_ms: 3000,
            wait_timeout_ms: 10000,
            poll_interval_ms: 250,
            scroll_step_px: 500,
            scroll_step_delay_ms: 500,
            jitter_ms: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            screenshots: false,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ScrapeError::ConfigurationError(format!("{}: {}", path.display(), e))
        })
    }

    /// Timing with every delay set to zero, for tests.
    pub fn instant() -> Self {
        Self {
            timing: TimingConfig::instant(),
            ..Default::default()
        }
    }
}

impl TimingConfig {
    pub fn instant() -> Self {
        Self {
            scroll_settle_ms: 0,
            click_settle_ms: 0,
            escape_settle_ms: 0,
            dismiss_retry_wait_ms: 0,
            navigation_settle_ms: 0,
            wait_timeout_ms: 0,
            poll_interval_ms: 1,
            scroll_step_px: 500,
            scroll_step_delay_ms: 0,
            jitter_ms: None,
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "timing": { "click_settle_ms": 50 } }"#).unwrap();
        assert_eq!(config.timing.click_settle_ms, 50);
        assert_eq!(config.timing.scroll_settle_ms, 300);
        assert!(!config.browser.headless);
        assert_eq!(config.output.directory, PathBuf::from("output"));
    }

    #[test]
    fn jitter_reads_as_pair() {
        let config: Config =
            serde_json::from_str(r#"{ "timing": { "jitter_ms": [200, 800] } }"#).unwrap();
        assert_eq!(config.timing.jitter_ms, Some((200, 800)));
    }

    #[test]
    fn loads_bundled_example() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.json");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.timing.jitter_ms, Some((200, 800)));
        assert_eq!(config.timing.poll_interval_ms, 250);
    }

    #[test]
    fn poll_interval_is_never_zero() {
        let mut timing = TimingConfig::instant();
        timing.poll_interval_ms = 0;
        assert_eq!(timing.poll_interval(), Duration::from_millis(1));
    }
}
