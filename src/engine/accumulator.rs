//! Per-unit card discovery, interaction and field extraction.

use super::classifier::StateClassifier;
use super::extract::{absolute_url, first_line, parse_price, parse_year, srcset_first};
use super::identity::{IdentityKey, SeenSet};
use super::interactor::{Action, DismissOutcome, Interactor, ObstructionPolicy};
use super::locator::{Found, Locator, Scope};
use super::plan::{CollectionPlan, Extract, ExtractionPlan, FieldScope, FieldSpec, Interaction, PrepStep};
use super::record::{ExtractedRecord, FieldMap, FieldValue, Verification};
use crate::core::config::TimingConfig;
use crate::core::PageDriver;
use crate::types::{ElementState, NodeHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Content-based exclusion of cards and preparation clicks.
pub trait ProhibitionRule: Send + Sync {
    fn prohibits(&self, text: &str) -> bool;
}

/// Case-insensitive substring match against a keyword list.
#[derive(Debug, Clone, Default)]
pub struct KeywordRule {
    keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl ProhibitionRule for KeywordRule {
    fn prohibits(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Terminal state of one discovered card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum CardOutcome {
    Recorded { degraded: bool },
    SkippedDuplicate,
    SkippedProhibited,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardReport {
    pub collection: String,
    pub identity: Option<IdentityKey>,
    #[serde(flatten)]
    pub outcome: CardOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardTally {
    pub discovered: usize,
    pub recorded: usize,
    pub skipped_duplicate: usize,
    pub skipped_prohibited: usize,
    pub failed: usize,
    pub degraded: usize,
}

impl CardTally {
    fn count(&mut self, outcome: &CardOutcome) {
        match outcome {
            CardOutcome::Recorded { degraded } => {
                self.recorded += 1;
                if *degraded {
                    self.degraded += 1;
                }
            }
            CardOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            CardOutcome::SkippedProhibited => self.skipped_prohibited += 1,
            CardOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn add(&mut self, other: &CardTally) {
        self.discovered += other.discovered;
        self.recorded += other.recorded;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_prohibited += other.skipped_prohibited;
        self.failed += other.failed;
        self.degraded += other.degraded;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepTally {
    pub clicked: usize,
    pub skipped_state: usize,
    pub skipped_prohibited: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
}

impl PrepTally {
    pub fn add(&mut self, other: &PrepTally) {
        self.clicked += other.clicked;
        self.skipped_state += other.skipped_state;
        self.skipped_prohibited += other.skipped_prohibited;
        self.skipped_duplicate += other.skipped_duplicate;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnitResult {
    pub records: Vec<ExtractedRecord>,
    pub cards: Vec<CardReport>,
    pub tally: CardTally,
    pub prep: PrepTally,
    pub persistent_obstructions: usize,
}

impl UnitResult {
    fn settle_card(&mut self, collection: &str, identity: Option<IdentityKey>, outcome: CardOutcome) {
        self.tally.count(&outcome);
        self.cards.push(CardReport {
            collection: collection.to_string(),
            identity,
            outcome,
        });
    }
}

pub struct ExtractionAccumulator<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    locator: Locator<'a, D>,
    interactor: Interactor<'a, D>,
    classifier: StateClassifier<'a, D>,
    obstruction: &'a ObstructionPolicy,
    prohibition: &'a dyn ProhibitionRule,
}

impl<'a, D: PageDriver + ?Sized> ExtractionAccumulator<'a, D> {
    pub fn new(
        driver: &'a D,
        timing: &'a TimingConfig,
        obstruction: &'a ObstructionPolicy,
        prohibition: &'a dyn ProhibitionRule,
    ) -> Self {
        Self {
            driver,
            locator: Locator::new(driver, timing),
            interactor: Interactor::new(driver, timing),
            classifier: StateClassifier::new(driver, timing),
            obstruction,
            prohibition,
        }
    }

    /// Run the preparation steps, then extract every collection of `plan`
    /// from the current page. Each identity key in `seen` is processed at
    /// most once.
    pub async fn run_unit(&self, unit: &str, plan: &ExtractionPlan, seen: &mut SeenSet) -> UnitResult {
        let mut result = UnitResult::default();
        self.prepare(&plan.prep, &mut result).await;

        let page_url = match self.driver.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("{}: current url unavailable: {}", unit, e);
                String::new()
            }
        };

        for collection in &plan.collections {
            let cards = self.locator.resolve_all(&collection.card, Scope::Page).await;
            info!("{}: {} {} card(s) discovered", unit, cards.len(), collection.name);
            for card in &cards {
                result.tally.discovered += 1;
                self.process_card(unit, collection, card, &page_url, seen, &mut result)
                    .await;
            }
        }

        info!(
            "{}: {} recorded, {} duplicate, {} prohibited, {} failed, {} degraded",
            unit,
            result.tally.recorded,
            result.tally.skipped_duplicate,
            result.tally.skipped_prohibited,
            result.tally.failed,
            result.tally.degraded
        );
        result
    }

    async fn process_card(
        &self,
        unit: &str,
        collection: &CollectionPlan,
        card: &Found,
        page_url: &str,
        seen: &mut SeenSet,
        result: &mut UnitResult,
    ) {
        let info = match self.driver.inspect(card.handle).await {
            Ok(info) => info,
            Err(e) => {
                warn!("{}: {} card {} failed: {}", unit, collection.name, card.handle, e);
                result.settle_card(&collection.name, None, CardOutcome::Failed { error: e.to_string() });
                return;
            }
        };

        let identity = IdentityKey::of(&info);
        if !seen.mark(&identity) {
            debug!("{}: duplicate card {}", unit, identity);
            result.settle_card(&collection.name, Some(identity), CardOutcome::SkippedDuplicate);
            return;
        }
        if self.prohibition.prohibits(&info.normalized_text()) {
            debug!("{}: prohibited card {}", unit, identity);
            result.settle_card(&collection.name, Some(identity), CardOutcome::SkippedProhibited);
            return;
        }

        let mut record = ExtractedRecord::new(identity.clone(), &collection.name, unit);
        let reads_page = collection.fields.iter().any(|f| f.scope == FieldScope::Page);
        let mut dismiss_pending = false;
        if let Some(interaction) = &collection.interaction {
            let (verification, degraded) = self.interact(card, interaction).await;
            record.verification = Some(verification);
            record.degraded = degraded;
            if interaction.dismiss_after {
                if reads_page {
                    dismiss_pending = true;
                } else {
                    self.dismiss(result).await;
                }
            }
        }

        for field in &collection.fields {
            self.fill_field(&mut record, card, field, page_url).await;
        }
        if dismiss_pending {
            self.dismiss(result).await;
        }
        if !record.failed_fields.is_empty() {
            debug!("{}: {} missing {:?}", unit, identity, record.failed_fields);
        }

        let outcome = CardOutcome::Recorded {
            degraded: record.degraded,
        };
        result.records.push(record);
        result.settle_card(&collection.name, Some(identity), outcome);
    }

    /// Drive the card's trigger into the desired state: no action when it is
    /// already there or its state is unknown, otherwise click with one retry.
    /// Returns the verification and whether the record is degraded.
    async fn interact(&self, card: &Found, interaction: &Interaction) -> (Verification, bool) {
        let trigger = match &interaction.trigger {
            None => card.clone(),
            Some(target) => match self.locator.resolve(target, Scope::from(card)).await.into_found() {
                Some(found) => found,
                None => {
                    debug!("{} has no {}", card.handle, target.name);
                    return (Verification::Unknown, true);
                }
            },
        };

        let state = self.classifier.classify(&trigger, &interaction.rule).await;
        if state == interaction.desired {
            return (Verification::Confirmed, false);
        }
        if state == ElementState::Unknown {
            return (Verification::Unknown, false);
        }

        for attempt in 1..=2 {
            let outcome = self
                .interactor
                .act_observed(&trigger, &Action::Click, &self.classifier, &interaction.rule)
                .await;
            if outcome.state_after == Some(interaction.desired) {
                return (Verification::Confirmed, false);
            }
            debug!(
                "{}: attempt {} left state {:?} (error: {:?})",
                trigger.target, attempt, outcome.state_after, outcome.error
            );
        }
        (Verification::Unknown, true)
    }

    async fn prepare(&self, steps: &[PrepStep], result: &mut UnitResult) {
        let mut clicked = SeenSet::new();
        for step in steps {
            let elements = self.locator.resolve_all(&step.target, Scope::Page).await;
            for element in &elements {
                let info = match self.driver.inspect(element.handle).await {
                    Ok(info) => info,
                    Err(e) => {
                        debug!("{}: {} went away: {}", step.target.name, element.handle, e);
                        result.prep.failed += 1;
                        continue;
                    }
                };
                if !clicked.mark(&IdentityKey::of(&info)) {
                    result.prep.skipped_duplicate += 1;
                    continue;
                }
                let text = info.normalized_text();
                if self.prohibition.prohibits(&text) {
                    debug!("{}: skipping prohibited `{}`", step.target.name, text);
                    result.prep.skipped_prohibited += 1;
                    continue;
                }
                if let (Some(rule), Some(desired)) = (&step.rule, step.desired) {
                    let state = self.classifier.classify(element, rule).await;
                    if state == desired || state == ElementState::Unknown {
                        result.prep.skipped_state += 1;
                        continue;
                    }
                }

                let outcome = self.interactor.act(element, &Action::Click).await;
                if outcome.succeeded {
                    result.prep.clicked += 1;
                } else {
                    result.prep.failed += 1;
                }
                if step.dismiss_after {
                    self.dismiss(result).await;
                }
            }
            debug!("{}: preparation tally {:?}", step.target.name, result.prep);
        }
    }

    async fn dismiss(&self, result: &mut UnitResult) {
        if self.interactor.dismiss_obstructions(self.obstruction).await == DismissOutcome::Persistent {
            result.persistent_obstructions += 1;
        }
    }

    async fn fill_field(&self, record: &mut ExtractedRecord, card: &Found, field: &FieldSpec, page_url: &str) {
        let Some(node) = self.field_node(card, field).await else {
            record.fail(&field.name);
            return;
        };

        let value = match &field.extract {
            Extract::Group(fields) => {
                let row = self.read_row(&node, fields, &field.name, record, page_url).await;
                Some(FieldValue::Nested(row))
            }
            Extract::List { item, fields } => {
                let items = self.locator.resolve_all(item, Scope::from(&node)).await;
                if items.is_empty() {
                    None
                } else {
                    let mut rows = Vec::with_capacity(items.len());
                    for item in &items {
                        rows.push(self.read_row(item, fields, &field.name, record, page_url).await);
                    }
                    Some(FieldValue::List(rows))
                }
            }
            extract => self.read(node.handle, extract, page_url).await,
        };

        match value {
            Some(value) => record.set(&field.name, value),
            None => record.fail(&field.name),
        }
    }

    /// Flat fields of a nested record. Missing ones are noted as
    /// `parent.field` on the owning record.
    async fn read_row(
        &self,
        scope: &Found,
        fields: &[FieldSpec],
        parent: &str,
        record: &mut ExtractedRecord,
        page_url: &str,
    ) -> FieldMap {
        let mut row = FieldMap::new();
        for field in fields {
            let value = match self.field_node(scope, field).await {
                Some(node) => self.read(node.handle, &field.extract, page_url).await,
                None => None,
            };
            match value {
                Some(value) => {
                    row.insert(field.name.clone(), value);
                }
                None => {
                    row.insert(field.name.clone(), FieldValue::empty());
                    record.note_failure(&format!("{}.{}", parent, field.name));
                }
            }
        }
        row
    }

    async fn field_node(&self, scope: &Found, field: &FieldSpec) -> Option<Found> {
        let Some(target) = &field.target else {
            return Some(scope.clone());
        };
        let within = match field.scope {
            FieldScope::Card => Scope::from(scope),
            FieldScope::Page => Scope::Page,
        };
        self.locator.resolve(target, within).await.into_found()
    }

    async fn read(&self, node: NodeHandle, extract: &Extract, page_url: &str) -> Option<FieldValue> {
        let info = match self.driver.inspect(node).await {
            Ok(info) => info,
            Err(e) => {
                debug!("could not read {}: {}", node, e);
                return None;
            }
        };

        match extract {
            Extract::Text => Some(info.normalized_text())
                .filter(|t| !t.is_empty())
                .map(FieldValue::Text),
            Extract::Attribute(name) => info.attribute(name).map(|v| FieldValue::Text(v.trim().to_string())),
            Extract::Price => parse_price(&info.text_content).map(FieldValue::Number),
            Extract::Year => parse_year(&info.text_content).map(FieldValue::Integer),
            Extract::FirstLine => first_line(&info.text_content).map(FieldValue::Text),
            Extract::SrcsetFirst => info
                .attribute("srcset")
                .and_then(srcset_first)
                .or_else(|| info.attribute("src").map(str::to_string))
                .map(FieldValue::Text),
            Extract::Url(attribute) => info
                .attribute(attribute)
                .map(|v| FieldValue::Text(absolute_url(page_url, v.trim()))),
            Extract::Group(_) | Extract::List { .. } => {
                debug!("nested groups and lists are only supported at the top level");
                None
            }
        }
    }
}
