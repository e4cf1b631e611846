//! Clicking, scrolling and key presses with fallback and settle waits.
//!
//! Nothing here returns an error to the caller: every failure is folded into
//! an [`InteractionOutcome`] or a [`DismissOutcome`].

use super::classifier::{ClassificationRule, StateClassifier};
use super::locator::{Found, Locator, ResolvedElement, Scope};
use super::target::Target;
use crate::core::config::TimingConfig;
use crate::core::PageDriver;
use crate::errors::Result;
use crate::types::ElementState;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    ScrollIntoView,
    SendKey(String),
}

/// Which click path delivered the click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClickMethod {
    /// Native pointer click.
    Primary,
    /// Programmatic `element.click()` after the native click was rejected.
    Fallback,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    pub method_used: Option<ClickMethod>,
    pub state_before: Option<ElementState>,
    pub state_after: Option<ElementState>,
    pub error: Option<String>,
}

impl InteractionOutcome {
    fn not_attempted(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            attempted: true,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn done(method_used: Option<ClickMethod>) -> Self {
        Self {
            attempted: true,
            succeeded: true,
            method_used,
            ..Default::default()
        }
    }
}

/// Targets used to detect and clear blocking overlays.
#[derive(Debug, Clone, Default)]
pub struct ObstructionPolicy {
    /// Present while a modal or overlay is blocking the page.
    pub indicator: Option<Target>,
    /// Last-resort close button.
    pub close_control: Option<Target>,
    /// Cookie consent accept button.
    pub consent: Option<Target>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DismissOutcome {
    Clear,
    ClearedByEscape,
    ClearedByCloseControl,
    Persistent,
}

pub struct Interactor<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    timing: &'a TimingConfig,
    locator: Locator<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> Interactor<'a, D> {
    pub fn new(driver: &'a D, timing: &'a TimingConfig) -> Self {
        Self {
            driver,
            timing,
            locator: Locator::new(driver, timing),
        }
    }

    /// Act on a resolved element; `NotFound` is reported as not attempted.
    pub async fn act_on(&self, element: &ResolvedElement, action: &Action) -> InteractionOutcome {
        match element.found() {
            Some(found) => self.act(found, action).await,
            None => InteractionOutcome::not_attempted(format!("{} not found", element.target_name())),
        }
    }

    pub async fn act(&self, element: &Found, action: &Action) -> InteractionOutcome {
        match action {
            Action::ScrollIntoView => match self.driver.scroll_into_view(element.handle).await {
                Ok(()) => {
                    self.settle(self.timing.scroll_settle_ms).await;
                    InteractionOutcome::done(None)
                }
                Err(e) => InteractionOutcome::failed(e.to_string()),
            },
            Action::SendKey(key) => match self.driver.press_key(key).await {
                Ok(()) => {
                    self.settle(self.timing.escape_settle_ms).await;
                    InteractionOutcome::done(None)
                }
                Err(e) => InteractionOutcome::failed(e.to_string()),
            },
            Action::Click => self.click(element).await,
        }
    }

    /// `act` with the element classified immediately before and after.
    pub async fn act_observed(
        &self,
        element: &Found,
        action: &Action,
        classifier: &StateClassifier<'_, D>,
        rule: &ClassificationRule,
    ) -> InteractionOutcome {
        let before = classifier.classify(element, rule).await;
        let mut outcome = self.act(element, action).await;
        outcome.state_before = Some(before);
        outcome.state_after = Some(classifier.classify(element, rule).await);
        outcome
    }

    async fn click(&self, element: &Found) -> InteractionOutcome {
        if let Err(e) = self.driver.scroll_into_view(element.handle).await {
            debug!("{}: scroll into view failed: {}", element.target, e);
        }
        self.settle(self.timing.scroll_settle_ms).await;

        match self.driver.inspect(element.handle).await {
            Ok(info) if info.is_visible && info.is_enabled => {}
            Ok(_) => return InteractionOutcome::not_attempted(format!("{} is not interactable", element.target)),
            Err(e) => return InteractionOutcome::not_attempted(e.to_string()),
        }

        let method = match self.driver.click(element.handle).await {
            Ok(()) => ClickMethod::Primary,
            Err(native) => {
                debug!("{}: native click rejected ({}), using programmatic click", element.target, native);
                match self.driver.click_programmatic(element.handle).await {
                    Ok(()) => ClickMethod::Fallback,
                    Err(e) => {
                        debug!("{}: programmatic click failed: {}", element.target, e);
                        return InteractionOutcome::failed(e.to_string());
                    }
                }
            }
        };

        self.settle(self.timing.click_settle_ms).await;
        InteractionOutcome::done(Some(method))
    }

    /// Escape, re-check, Escape again, then the explicit close control.
    pub async fn dismiss_obstructions(&self, policy: &ObstructionPolicy) -> DismissOutcome {
        let Some(indicator) = &policy.indicator else {
            self.press_escape().await;
            return DismissOutcome::Clear;
        };

        let blocked = self.locator.is_present(indicator).await;
        self.press_escape().await;
        if !self.locator.is_present(indicator).await {
            return if blocked {
                DismissOutcome::ClearedByEscape
            } else {
                DismissOutcome::Clear
            };
        }

        self.settle(self.timing.dismiss_retry_wait_ms).await;
        self.press_escape().await;
        if !self.locator.is_present(indicator).await {
            return DismissOutcome::ClearedByEscape;
        }

        if let Some(close) = &policy.close_control {
            let resolved = self.locator.resolve(close, Scope::Page).await;
            let outcome = self.act_on(&resolved, &Action::Click).await;
            if outcome.succeeded && !self.locator.is_present(indicator).await {
                info!("obstruction closed via {}", close.name);
                return DismissOutcome::ClearedByCloseControl;
            }
        }

        warn!("obstruction {} is still present after dismissal", indicator.name);
        DismissOutcome::Persistent
    }

    /// Click the cookie consent button when one is showing.
    pub async fn accept_consent(&self, policy: &ObstructionPolicy) -> bool {
        let Some(consent) = &policy.consent else {
            return false;
        };
        let resolved = self.locator.resolve(consent, Scope::Page).await;
        if !resolved.is_found() {
            return false;
        }
        let outcome = self.act_on(&resolved, &Action::Click).await;
        if outcome.succeeded {
            info!("cookie consent accepted");
        }
        outcome.succeeded
    }

    /// Walk the page top to bottom so lazy content renders, then go back up.
    pub async fn scroll_gradually(&self) -> Result<()> {
        let height = self.driver.page_height().await?;
        let step = f64::from(self.timing.scroll_step_px.max(1));
        let mut position = 0.0;
        while position < height {
            self.driver.scroll_to(position).await?;
            self.sleep_ms(self.timing.scroll_step_delay_ms).await;
            position += step;
        }
        self.driver.scroll_to(0.0).await?;
        self.settle(self.timing.scroll_settle_ms).await;
        Ok(())
    }

    async fn press_escape(&self) {
        if let Err(e) = self.driver.press_key("Escape").await {
            debug!("escape failed: {}", e);
        }
        self.settle(self.timing.escape_settle_ms).await;
    }

    /// Fixed settle delay plus configured jitter.
    pub async fn settle(&self, base_ms: u64) {
        let extra = match self.timing.jitter_ms {
            Some((a, b)) => rand::thread_rng().gen_range(a.min(b)..=a.max(b)),
            None => 0,
        };
        self.sleep_ms(base_ms + extra).await;
    }

    async fn sleep_ms(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ClickKind, FakePage};

    async fn find(page: &FakePage, timing: &TimingConfig, css: &str) -> Found {
        Locator::new(page, timing)
            .resolve(&Target::new("el").css(css), Scope::Page)
            .await
            .into_found()
            .unwrap()
    }

    #[tokio::test]
    async fn native_click_is_primary() {
        let page = FakePage::new(r#"<button class="go">Go</button>"#);
        let timing = TimingConfig::instant();
        let button = find(&page, &timing, ".go").await;

        let outcome = Interactor::new(&page, &timing).act(&button, &Action::Click).await;
        assert!(outcome.attempted && outcome.succeeded);
        assert_eq!(outcome.method_used, Some(ClickMethod::Primary));
        assert_eq!(page.clicks(), vec![(button.handle, ClickKind::Native)]);
    }

    #[tokio::test]
    async fn obstructed_click_falls_back() {
        let page = FakePage::new(r#"<button class="go">Go</button>"#).obstruct(".go");
        let timing = TimingConfig::instant();
        let button = find(&page, &timing, ".go").await;

        let outcome = Interactor::new(&page, &timing).act(&button, &Action::Click).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.method_used, Some(ClickMethod::Fallback));
    }

    #[tokio::test]
    async fn failures_become_outcomes() {
        let page = FakePage::new(r#"<button class="go">Go</button><button class="off" disabled>Off</button>"#)
            .break_clicks(".go");
        let timing = TimingConfig::instant();
        let interactor = Interactor::new(&page, &timing);

        let go = find(&page, &timing, ".go").await;
        let outcome = interactor.act(&go, &Action::Click).await;
        assert!(outcome.attempted);
        assert!(!outcome.succeeded);
        assert!(outcome.error.is_some());

        let off = find(&page, &timing, ".off").await;
        let outcome = interactor.act(&off, &Action::Click).await;
        assert!(!outcome.attempted);

        let missing = ResolvedElement::NotFound { target: "ghost".into() };
        let outcome = interactor.act_on(&missing, &Action::Click).await;
        assert!(!outcome.attempted && !outcome.succeeded);
    }

    #[tokio::test]
    async fn observed_click_records_states() {
        let page = FakePage::new(r#"<div class="acc" aria-expanded="false">Safety</div>"#).on_click(
            ".acc",
            r#"aria-expanded="false""#,
            r#"aria-expanded="true""#,
        );
        let timing = TimingConfig::instant();
        let acc = find(&page, &timing, ".acc").await;
        let rule = ClassificationRule::default().fallback(
            "aria-expanded",
            &[("true", ElementState::ExpandableExpanded), ("false", ElementState::ExpandableCollapsed)],
        );
        let classifier = StateClassifier::new(&page, &timing);

        let outcome = Interactor::new(&page, &timing)
            .act_observed(&acc, &Action::Click, &classifier, &rule)
            .await;
        assert_eq!(outcome.state_before, Some(ElementState::ExpandableCollapsed));
        assert_eq!(outcome.state_after, Some(ElementState::ExpandableExpanded));
    }

    fn modal_policy() -> ObstructionPolicy {
        ObstructionPolicy {
            indicator: Some(Target::new("modal").css(".modal")),
            close_control: Some(Target::new("close").css(".modal .close")),
            consent: Some(Target::new("consent").css("#accept-cookies")),
        }
    }

    #[tokio::test]
    async fn escape_clears_modal() {
        let page = FakePage::new(r#"<div class="modal">Offer<button class="close">x</button></div>"#)
            .on_key("Escape", r#"class="modal""#, r#"class="modal" hidden="""#);
        let timing = TimingConfig::instant();

        let outcome = Interactor::new(&page, &timing).dismiss_obstructions(&modal_policy()).await;
        assert_eq!(outcome, DismissOutcome::ClearedByEscape);
        assert_eq!(page.keys(), vec!["Escape"]);
    }

    #[tokio::test]
    async fn close_control_is_last_resort() {
        let page = FakePage::new(r#"<div class="modal">Offer<button class="close">x</button></div>"#)
            .on_click_global(".close", r#"class="modal""#, r#"class="modal" hidden="""#);
        let timing = TimingConfig::instant();

        let outcome = Interactor::new(&page, &timing).dismiss_obstructions(&modal_policy()).await;
        assert_eq!(outcome, DismissOutcome::ClearedByCloseControl);
        assert_eq!(page.keys().len(), 2);
    }

    #[tokio::test]
    async fn stubborn_modal_is_persistent() {
        let page = FakePage::new(r#"<div class="modal">Offer</div>"#);
        let timing = TimingConfig::instant();

        let outcome = Interactor::new(&page, &timing).dismiss_obstructions(&modal_policy()).await;
        assert_eq!(outcome, DismissOutcome::Persistent);
    }

    #[tokio::test]
    async fn nothing_to_dismiss_is_clear() {
        let page = FakePage::new("<main></main>");
        let timing = TimingConfig::instant();

        let outcome = Interactor::new(&page, &timing).dismiss_obstructions(&modal_policy()).await;
        assert_eq!(outcome, DismissOutcome::Clear);
    }

    #[tokio::test]
    async fn consent_clicked_when_present() {
        let page = FakePage::new(r#"<button id="accept-cookies">Accept</button>"#);
        let timing = TimingConfig::instant();
        let interactor = Interactor::new(&page, &timing);

        assert!(interactor.accept_consent(&modal_policy()).await);
        assert_eq!(page.clicks().len(), 1);
        assert!(!interactor.accept_consent(&ObstructionPolicy::default()).await);
    }

    #[tokio::test]
    async fn gradual_scroll_returns_to_top() {
        let page = FakePage::new("<main><p>a</p><p>b</p></main>");
        let mut timing = TimingConfig::instant();
        timing.scroll_step_px = 40;
        Interactor::new(&page, &timing).scroll_gradually().await.unwrap();

        let scrolls = page.scrolls();
        assert_eq!(scrolls.first(), Some(&0.0));
        assert_eq!(scrolls.last(), Some(&0.0));
        assert!(scrolls.len() > 2);
    }
}
