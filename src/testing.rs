//! In-memory [`PageDriver`] for exercising the engine without a browser.
//!
//! The page is an HTML document parsed with `scraper` on every call. Handles
//! are document-order element indices, so they stay valid across attribute
//! and text changes but not across structural ones, like the real thing.
//!
//! Behaviour a browser would provide is scripted:
//! - `data-rect="x,y,w,h"` fixes an element's geometry (default: a unique
//!   row per element);
//! - `hidden`, `display:none` and `visibility:hidden` make it invisible;
//! - `disabled` / `aria-disabled="true"` make it disabled;
//! - [`FakePage::on_click`] and [`FakePage::on_key`] rewrite markup in
//!   response to interactions;
//! - [`FakePage::obstruct`] makes native clicks on matching elements fail as
//!   intercepted.
//!
//! Queries are CSS, plus the text-contains XPath that text targets compile
//! to. Any other XPath fails as a query error.

use crate::core::{PageDriver, Query};
use crate::errors::{Result, ScrapeError};
use crate::types::{ElementInfo, ElementRect, NodeHandle};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Native,
    Programmatic,
}

#[derive(Debug, Clone)]
enum Trigger {
    Click(String),
    Key(String),
}

#[derive(Debug, Clone)]
struct Reaction {
    trigger: Trigger,
    from: String,
    to: String,
    /// Rewrite inside the clicked element only.
    local: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    html: String,
    url: String,
    pages: HashMap<String, String>,
    reactions: Vec<Reaction>,
    obstructed: Vec<String>,
    broken: Vec<String>,
    stale_after: Vec<(String, usize)>,
    inspections: HashMap<u64, usize>,
    clicks: Vec<(u64, ClickKind)>,
    keys: Vec<String>,
    scrolls: Vec<f64>,
    queries: usize,
    closed: bool,
}

pub struct FakePage {
    state: Mutex<FakeState>,
}

fn normalize(html: &str) -> String {
    Html::parse_document(html).html()
}

fn elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.tree.root().descendants().filter_map(ElementRef::wrap).collect()
}

fn matches_any(element: &ElementRef<'_>, selectors: &[String]) -> bool {
    selectors.iter().any(|css| {
        Selector::parse(css)
            .map(|selector| selector.matches(element))
            .unwrap_or(false)
    })
}

fn is_hidden(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    let style = value.attr("style").unwrap_or("").replace(' ', "").to_lowercase();
    style.contains("display:none") || style.contains("visibility:hidden")
}

fn is_visible(element: &ElementRef<'_>) -> bool {
    if is_hidden(element) {
        return false;
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .all(|ancestor| !is_hidden(&ancestor))
}

const TEXT_QUERY_PREFIX: &str = ".//*[text()[contains(normalize-space(.), ";
const TEXT_QUERY_SUFFIX: &str = ")]]";

/// The needle of a text-contains XPath, the only XPath form the fake page
/// understands. Accepts a quoted literal or a `concat(...)` of them.
fn text_contains_literal(xpath: &str) -> Option<String> {
    let literal = xpath.strip_prefix(TEXT_QUERY_PREFIX)?.strip_suffix(TEXT_QUERY_SUFFIX)?;
    let (literal, concat) = match literal.strip_prefix("concat(").and_then(|l| l.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (literal, false),
    };

    let mut parts = Vec::new();
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                let part: String = chars.by_ref().take_while(|&q| q != c).collect();
                parts.push(part);
            }
            ',' if concat => {}
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }
    if parts.is_empty() || (!concat && parts.len() > 1) {
        return None;
    }
    Some(parts.concat())
}

/// Whether one of the element's own text nodes, whitespace-normalized,
/// contains `needle`.
fn own_text_contains(element: &ElementRef<'_>, needle: &str) -> bool {
    element
        .children()
        .filter_map(|child| child.value().as_text())
        .any(|text| text.split_whitespace().collect::<Vec<_>>().join(" ").contains(needle))
}

fn parse_rect(raw: &str) -> Option<ElementRect> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [x, y, width, height] => Some(ElementRect {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => None,
    }
}

impl FakePage {
    pub fn new(html: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                html: normalize(html),
                url: "about:blank".to_string(),
                ..Default::default()
            }),
        }
    }

    /// Register a document served when `url` is navigated to.
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.lock().pages.insert(url.to_string(), normalize(html));
        self
    }

    /// After a click on an element matching `css`, replace the first `from`
    /// inside that element with `to`.
    pub fn on_click(self, css: &str, from: &str, to: &str) -> Self {
        self.lock().reactions.push(Reaction {
            trigger: Trigger::Click(css.to_string()),
            from: from.to_string(),
            to: to.to_string(),
            local: true,
        });
        self
    }

    /// After a click on an element matching `css`, replace the first `from`
    /// anywhere in the document.
    pub fn on_click_global(self, css: &str, from: &str, to: &str) -> Self {
        self.lock().reactions.push(Reaction {
            trigger: Trigger::Click(css.to_string()),
            from: from.to_string(),
            to: to.to_string(),
            local: false,
        });
        self
    }

    /// After `key` is pressed, replace the first `from` in the document.
    pub fn on_key(self, key: &str, from: &str, to: &str) -> Self {
        self.lock().reactions.push(Reaction {
            trigger: Trigger::Key(key.to_string()),
            from: from.to_string(),
            to: to.to_string(),
            local: false,
        });
        self
    }

    /// Native clicks on matching elements are intercepted.
    pub fn obstruct(self, css: &str) -> Self {
        self.lock().obstructed.push(css.to_string());
        self
    }

    /// Every click on matching elements fails.
    pub fn break_clicks(self, css: &str) -> Self {
        self.lock().broken.push(css.to_string());
        self
    }

    /// Matching elements detach after `n` successful inspections.
    pub fn stale_after(self, css: &str, n: usize) -> Self {
        self.lock().stale_after.push((css.to_string(), n));
        self
    }

    pub fn html(&self) -> String {
        self.lock().html.clone()
    }

    pub fn text_of(&self, node: NodeHandle) -> String {
        let html = self.html();
        let doc = Html::parse_document(&html);
        elements(&doc)
            .get(node.id() as usize)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<(NodeHandle, ClickKind)> {
        self.lock()
            .clicks
            .iter()
            .map(|(id, kind)| (NodeHandle::new(*id), *kind))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys.clone()
    }

    pub fn scrolls(&self) -> Vec<f64> {
        self.lock().scrolls.clone()
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn click_as(&self, node: NodeHandle, kind: ClickKind) -> Result<()> {
        let mut state = self.lock();
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let element = all
            .get(node.id() as usize)
            .ok_or(ScrapeError::StaleHandle(node.id()))?;

        if matches_any(element, &state.broken) {
            return Err(ScrapeError::JavaScriptFailed(format!("click on {} threw", node)));
        }
        if kind == ClickKind::Native && matches_any(element, &state.obstructed) {
            return Err(ScrapeError::ActionRejected(format!(
                "{} is obscured by another element",
                node
            )));
        }

        // Serialize the document from the same parse as the element so both
        // agree on attribute order, then locate the element by its ordinal
        // among identical serializations.
        let mut outer = element.html();
        let mut html = doc.html();
        let ordinal = all[..node.id() as usize]
            .iter()
            .filter(|el| el.html() == outer)
            .count();
        let start = html.match_indices(outer.as_str()).nth(ordinal).map(|(i, _)| i);

        let triggered: Vec<&Reaction> = state
            .reactions
            .iter()
            .filter(|r| matches!(&r.trigger, Trigger::Click(css) if matches_any(element, std::slice::from_ref(css))))
            .collect();
        if let Some(start) = start {
            for reaction in triggered.iter().filter(|r| r.local) {
                if outer.contains(&reaction.from) {
                    let rewritten = outer.replacen(&reaction.from, &reaction.to, 1);
                    html.replace_range(start..start + outer.len(), &rewritten);
                    outer = rewritten;
                }
            }
        }
        for reaction in triggered.iter().filter(|r| !r.local) {
            html = html.replacen(&reaction.from, &reaction.to, 1);
        }
        state.html = normalize(&html);
        state.clicks.push((node.id(), kind));
        Ok(())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        let html = state
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::NavigationFailed(format!("no page at {}", url)))?;
        state.html = html;
        state.url = url.to_string();
        state.inspections.clear();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().url.clone())
    }

    async fn query(&self, scope: Option<NodeHandle>, query: &Query) -> Result<Vec<NodeHandle>> {
        let mut state = self.lock();
        state.queries += 1;
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let index: HashMap<_, _> = all
            .iter()
            .enumerate()
            .map(|(i, el)| (el.id(), i as u64))
            .collect();
        let root = match scope {
            None => None,
            Some(node) => Some(*all.get(node.id() as usize).ok_or(ScrapeError::StaleHandle(node.id()))?),
        };

        let matches: Vec<ElementRef<'_>> = match query {
            Query::Css(css) => {
                let selector = Selector::parse(css)
                    .map_err(|e| ScrapeError::QueryFailed(format!("{}: {:?}", css, e)))?;
                match root {
                    None => doc.select(&selector).collect(),
                    Some(root) => root.select(&selector).collect(),
                }
            }
            Query::XPath(xpath) => {
                let needle = text_contains_literal(xpath).ok_or_else(|| {
                    ScrapeError::QueryFailed(format!("xpath not supported by fake page: {}", xpath))
                })?;
                let candidates: Vec<ElementRef<'_>> = match root {
                    None => all.clone(),
                    Some(root) => root.descendants().skip(1).filter_map(ElementRef::wrap).collect(),
                };
                candidates
                    .into_iter()
                    .filter(|el| own_text_contains(el, &needle))
                    .collect()
            }
        };
        Ok(matches
            .iter()
            .filter_map(|el| index.get(&el.id()).copied())
            .map(NodeHandle::new)
            .collect())
    }

    async fn inspect(&self, node: NodeHandle) -> Result<ElementInfo> {
        let mut state = self.lock();
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let element = all
            .get(node.id() as usize)
            .ok_or(ScrapeError::StaleHandle(node.id()))?;

        let limit = state
            .stale_after
            .iter()
            .find(|(css, _)| matches_any(element, std::slice::from_ref(css)))
            .map(|(_, n)| *n);
        if let Some(limit) = limit {
            let seen = state.inspections.entry(node.id()).or_insert(0);
            if *seen >= limit {
                return Err(ScrapeError::StaleHandle(node.id()));
            }
            *seen += 1;
        }

        let value = element.value();
        let attributes: HashMap<String, String> = value
            .attrs()
            .map(|(name, v)| (name.to_string(), v.to_string()))
            .collect();
        let rect = value.attr("data-rect").and_then(parse_rect).or(Some(ElementRect {
            x: 0.0,
            y: node.id() as f64 * 20.0,
            width: 100.0,
            height: 20.0,
        }));
        let is_enabled =
            value.attr("disabled").is_none() && value.attr("aria-disabled") != Some("true");

        Ok(ElementInfo {
            tag_name: value.name().to_string(),
            text_content: element.text().collect::<String>(),
            attributes,
            rect,
            is_visible: is_visible(element),
            is_enabled,
        })
    }

    async fn inner_html(&self, node: NodeHandle) -> Result<String> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        elements(&doc)
            .get(node.id() as usize)
            .map(|el| el.inner_html())
            .ok_or(ScrapeError::StaleHandle(node.id()))
    }

    async fn scroll_into_view(&self, node: NodeHandle) -> Result<()> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        if elements(&doc).get(node.id() as usize).is_none() {
            return Err(ScrapeError::StaleHandle(node.id()));
        }
        Ok(())
    }

    async fn click(&self, node: NodeHandle) -> Result<()> {
        self.click_as(node, ClickKind::Native)
    }

    async fn click_programmatic(&self, node: NodeHandle) -> Result<()> {
        self.click_as(node, ClickKind::Programmatic)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        let mut html = state.html.clone();
        for reaction in &state.reactions {
            if matches!(&reaction.trigger, Trigger::Key(k) if k == key) {
                html = html.replacen(&reaction.from, &reaction.to, 1);
            }
        }
        state.html = normalize(&html);
        state.keys.push(key.to_string());
        Ok(())
    }

    async fn scroll_to(&self, y: f64) -> Result<()> {
        self.lock().scrolls.push(y);
        Ok(())
    }

    async fn page_height(&self) -> Result<f64> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        Ok(elements(&doc).len() as f64 * 20.0)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn click_reaction_rewrites_only_clicked_element() {
        let page = FakePage::new(
            r#"<button class="t" aria-expanded="false">A</button>
               <button class="t" aria-expanded="false">B</button>"#,
        )
        .on_click(".t", r#"aria-expanded="false""#, r#"aria-expanded="true""#);

        let buttons = page.query(None, &Query::Css(".t".into())).await.unwrap();
        page.click(buttons[1]).await.unwrap();

        let first = page.inspect(buttons[0]).await.unwrap();
        let second = page.inspect(buttons[1]).await.unwrap();
        assert_eq!(first.attribute("aria-expanded"), Some("false"));
        assert_eq!(second.attribute("aria-expanded"), Some("true"));
    }

    #[tokio::test]
    async fn identical_siblings_rewrite_the_clicked_one() {
        let page = FakePage::new(
            r#"<button class="t" id="x" data-a="1" data-b="2" title="more" aria-expanded="false">A</button>
               <button class="t" id="x" data-a="1" data-b="2" title="more" aria-expanded="false">A</button>
               <button class="t" id="x" data-a="1" data-b="2" title="more" aria-expanded="false">A</button>"#,
        )
        .on_click(".t", r#"aria-expanded="false""#, r#"aria-expanded="true""#);
        let buttons = page.query(None, &Query::Css(".t".into())).await.unwrap();

        for round in 0..5 {
            page.click(buttons[2]).await.unwrap();
            page.click(buttons[1]).await.unwrap();
            let states: Vec<_> = expanded_states(&page, &buttons).await;
            assert_eq!(states, vec!["false", "true", "true"], "round {}", round);
        }
        assert_eq!(page.clicks().len(), 10);
    }

    async fn expanded_states(page: &FakePage, buttons: &[NodeHandle]) -> Vec<String> {
        let mut states = Vec::new();
        for button in buttons {
            let info = page.inspect(*button).await.unwrap();
            states.push(info.attribute("aria-expanded").unwrap_or_default().to_string());
        }
        states
    }

    #[tokio::test]
    async fn text_xpath_matches_own_text_nodes() {
        let page = FakePage::new(
            r#"<div class="card"><button>  Show
                 more </button><p>Say "hi" it's <b>bold</b></p></div>
               <button>Show more</button>"#,
        );
        let card = page.query(None, &Query::Css(".card".into())).await.unwrap()[0];
        let show = Query::XPath(r#".//*[text()[contains(normalize-space(.), "Show more")]]"#.into());

        assert_eq!(page.query(None, &show).await.unwrap().len(), 2);
        let scoped = page.query(Some(card), &show).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(page.inspect(scoped[0]).await.unwrap().normalized_text(), "Show more");

        let quoted = Query::XPath(
            r#".//*[text()[contains(normalize-space(.), concat("Say ", '"', "hi", '"', " it's"))]]"#.into(),
        );
        let para = page.query(None, &quoted).await.unwrap();
        assert_eq!(page.inspect(para[0]).await.unwrap().tag_name, "p");

        // descendant text does not count as the element's own
        let bold = Query::XPath(r#".//*[text()[contains(normalize-space(.), "bold")]]"#.into());
        let found = page.query(None, &bold).await.unwrap();
        assert_eq!(page.inspect(found[0]).await.unwrap().tag_name, "b");
        assert_eq!(found.len(), 1);

        let other = Query::XPath("//img".into());
        assert!(matches!(page.query(None, &other).await, Err(ScrapeError::QueryFailed(_))));
    }

    #[tokio::test]
    async fn obstructed_elements_reject_native_clicks_only() {
        let page = FakePage::new(r#"<button class="b">go</button>"#).obstruct(".b");
        let button = page.query(None, &Query::Css(".b".into())).await.unwrap()[0];

        assert!(matches!(page.click(button).await, Err(ScrapeError::ActionRejected(_))));
        assert!(page.click_programmatic(button).await.is_ok());
        assert_eq!(page.clicks(), vec![(button, ClickKind::Programmatic)]);
    }

    #[tokio::test]
    async fn visibility_is_inherited() {
        let page = FakePage::new(r#"<div style="display: none"><span class="s">x</span></div>"#);
        let span = page.query(None, &Query::Css(".s".into())).await.unwrap()[0];
        assert!(!page.inspect(span).await.unwrap().is_visible);
    }

    #[tokio::test]
    async fn explicit_rect_overrides_default() {
        let page = FakePage::new(r#"<div class="c" data-rect="10,200,300,40">x</div>"#);
        let div = page.query(None, &Query::Css(".c".into())).await.unwrap()[0];
        let rect = page.inspect(div).await.unwrap().rect.unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (10.0, 200.0, 300.0, 40.0));
    }

    #[tokio::test]
    async fn unknown_page_fails_navigation() {
        let page = FakePage::new("").with_page("https://example.test/a", "<p>a</p>");
        assert!(page.navigate("https://example.test/a").await.is_ok());
        assert_eq!(page.current_url().await.unwrap(), "https://example.test/a");
        assert!(page.navigate("https://example.test/b").await.is_err());

        page.close().await.unwrap();
        assert!(page.is_closed());
    }
}
