use crate::errors::Result;
use crate::types::{ElementInfo, NodeHandle};
use async_trait::async_trait;
use std::fmt;

/// A concrete query the driver knows how to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Css(String),
    XPath(String),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Css(q) => write!(f, "css `{}`", q),
            Query::XPath(q) => write!(f, "xpath `{}`", q),
        }
    }
}

/// The page surface the engine drives.
///
/// Everything above this trait is browser-agnostic; implementations exist for
/// a live Chrome tab and for an in-memory page used by tests. All operations
/// are issued one at a time by a single owner.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page and wait until the navigation is committed.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current page URL.
    async fn current_url(&self) -> Result<String>;

    /// Run `query` inside `scope` (the whole document when `None`) and return
    /// the matches in document order.
    async fn query(&self, scope: Option<NodeHandle>, query: &Query) -> Result<Vec<NodeHandle>>;

    /// Read tag, text, attributes, geometry and interactability of a node.
    async fn inspect(&self, node: NodeHandle) -> Result<ElementInfo>;

    async fn inner_html(&self, node: NodeHandle) -> Result<String>;

    async fn scroll_into_view(&self, node: NodeHandle) -> Result<()>;

    /// Native, pointer-driven click. Fails with
    /// [`ScrapeError::ActionRejected`](crate::errors::ScrapeError::ActionRejected)
    /// when something else would receive the click.
    async fn click(&self, node: NodeHandle) -> Result<()>;

    /// Programmatic `element.click()`, bypassing hit testing.
    async fn click_programmatic(&self, node: NodeHandle) -> Result<()>;

    /// Dispatch a key press to the focused document, e.g. `"Escape"`.
    async fn press_key(&self, key: &str) -> Result<()>;

    async fn scroll_to(&self, y: f64) -> Result<()>;

    async fn page_height(&self) -> Result<f64>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Release the underlying browser resources.
    async fn close(&self) -> Result<()>;
}
