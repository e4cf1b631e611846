use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque reference to a live DOM node held by a [`PageDriver`](crate::core::PageDriver).
///
/// Handles are only meaningful to the driver that produced them and only
/// until the next navigation or structural DOM change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Point-in-time snapshot of one element, read in a single driver round trip.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ElementInfo {
    pub tag_name: String,
    pub text_content: String,
    pub attributes: HashMap<String, String>,
    pub rect: Option<ElementRect>,
    pub is_visible: bool,
    pub is_enabled: bool,
}

impl ElementInfo {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Text with runs of whitespace collapsed to single spaces.
    pub fn normalized_text(&self) -> String {
        self.text_content.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Classified state of an element, derived fresh from its rendered structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementState {
    ExpandableCollapsed,
    ExpandableExpanded,
    Selected,
    Unselected,
    Unknown,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementState::ExpandableCollapsed => "expandable-collapsed",
            ElementState::ExpandableExpanded => "expandable-expanded",
            ElementState::Selected => "selected",
            ElementState::Unselected => "unselected",
            ElementState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
