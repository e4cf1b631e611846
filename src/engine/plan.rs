//! What to do on a page once it is ready: preparation clicks and the
//! collections of cards to extract.

use super::classifier::ClassificationRule;
use super::target::Target;
use crate::types::ElementState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum Extract {
    /// Whitespace-normalized text.
    Text,
    Attribute(String),
    /// First currency amount in the text, as a number.
    Price,
    /// First four-digit year in the text.
    Year,
    /// First non-blank line of the text.
    FirstLine,
    /// First URL of `srcset`, else `src`.
    SrcsetFirst,
    /// Attribute value resolved against the page URL.
    Url(String),
    /// Nested record read from the field's element.
    Group(Vec<FieldSpec>),
    /// One nested record per matching item.
    List { item: Target, fields: Vec<FieldSpec> },
}

/// Where a field's target is looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldScope {
    /// Inside the card (or the enclosing group or list item).
    #[default]
    Card,
    /// Anywhere on the page, e.g. a details dialog the card's interaction
    /// opened. Reading such a field postpones the interaction's dismissal
    /// until the card's fields are read.
    Page,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    /// Element to read, relative to `scope`. `None` reads the card itself.
    pub target: Option<Target>,
    pub extract: Extract,
    pub scope: FieldScope,
}

impl FieldSpec {
    pub fn new(name: &str, target: Option<Target>, extract: Extract) -> Self {
        Self {
            name: name.to_string(),
            target,
            extract,
            scope: FieldScope::Card,
        }
    }

    pub fn on_page(mut self) -> Self {
        self.scope = FieldScope::Page;
        self
    }
}

/// Bring a card into `desired` state before its fields are read.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// Element to click, relative to the card. `None` clicks the card.
    pub trigger: Option<Target>,
    pub rule: ClassificationRule,
    pub desired: ElementState,
    pub dismiss_after: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPlan {
    pub name: String,
    pub card: Target,
    pub interaction: Option<Interaction>,
    pub fields: Vec<FieldSpec>,
}

/// Click every element matching `target` once, e.g. "show more" buttons
/// or collapsed sections. With a rule, elements already in `desired` state
/// (or of unknown state) are left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepStep {
    pub target: Target,
    pub rule: Option<ClassificationRule>,
    pub desired: Option<ElementState>,
    pub dismiss_after: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionPlan {
    pub prep: Vec<PrepStep>,
    pub collections: Vec<CollectionPlan>,
}
