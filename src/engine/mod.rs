//! The browser-agnostic interaction engine.
//!
//! [`Locator`] finds elements through ordered fallback strategies,
//! [`Interactor`] acts on them, [`StateClassifier`] reads their state back and
//! [`ExtractionAccumulator`] composes the three into per-unit extraction.

pub mod accumulator;
pub mod classifier;
pub mod extract;
pub mod identity;
pub mod interactor;
pub mod locator;
pub mod plan;
pub mod record;
pub mod target;

pub use accumulator::{
    CardOutcome, CardReport, CardTally, ExtractionAccumulator, KeywordRule, PrepTally, ProhibitionRule,
    UnitResult,
};
pub use classifier::{ClassificationRule, Payload, Probe, StateClassifier};
pub use identity::{IdentityKey, SeenSet};
pub use interactor::{Action, ClickMethod, DismissOutcome, InteractionOutcome, Interactor, ObstructionPolicy};
pub use locator::{Found, Locator, ResolvedElement, Scope};
pub use plan::{CollectionPlan, Extract, ExtractionPlan, FieldScope, FieldSpec, Interaction, PrepStep};
pub use record::{ExtractedRecord, FieldMap, FieldValue, Verification};
pub use target::{Predicate, SelectionMethod, Strategy, Target};
