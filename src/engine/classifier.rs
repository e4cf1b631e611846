//! Element state classification from rendered structure.

use super::locator::{Found, Locator, Scope};
use super::target::Target;
use crate::core::config::TimingConfig;
use crate::core::PageDriver;
use crate::errors::Result;
use crate::types::{ElementState, NodeHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// What part of a probed node is compared against the marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Payload {
    InnerHtml,
    Text,
    Attribute { name: String },
}

/// One `(sub-query, marker, state)` check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Node to inspect, relative to the classified element. `None` inspects
    /// the element itself.
    #[serde(default)]
    pub target: Option<Target>,
    pub payload: Payload,
    pub marker: String,
    pub state: ElementState,
}

/// Boolean-ish attribute on the element itself, consulted when no probe
/// produced a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFallback {
    pub attribute: String,
    pub values: BTreeMap<String, ElementState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    #[serde(default)]
    pub probes: Vec<Probe>,
    #[serde(default)]
    pub fallback: Option<AttributeFallback>,
}

impl ClassificationRule {
    pub fn probe(mut self, target: Option<Target>, payload: Payload, marker: &str, state: ElementState) -> Self {
        self.probes.push(Probe {
            target,
            payload,
            marker: marker.to_string(),
            state,
        });
        self
    }

    pub fn fallback(mut self, attribute: &str, values: &[(&str, ElementState)]) -> Self {
        self.fallback = Some(AttributeFallback {
            attribute: attribute.to_string(),
            values: values.iter().map(|(v, s)| (v.to_string(), *s)).collect(),
        });
        self
    }
}

/// Stateless; every call reads the live element again.
pub struct StateClassifier<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    locator: Locator<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> StateClassifier<'a, D> {
    pub fn new(driver: &'a D, timing: &'a TimingConfig) -> Self {
        Self {
            driver,
            locator: Locator::new(driver, timing),
        }
    }

    pub async fn classify(&self, element: &Found, rule: &ClassificationRule) -> ElementState {
        for probe in &rule.probes {
            let node = match &probe.target {
                None => element.handle,
                Some(target) => match self.locator.resolve(target, Scope::from(element)).await.into_found() {
                    Some(found) => found.handle,
                    None => continue,
                },
            };
            match self.read_payload(node, &probe.payload).await {
                Ok(Some(payload)) if payload.contains(&probe.marker) => {
                    debug!("{}: probe matched `{}` -> {}", element.target, probe.marker, probe.state);
                    return probe.state;
                }
                Ok(_) => {}
                Err(e) => debug!("{}: probe read failed: {}", element.target, e),
            }
        }

        if let Some(fallback) = &rule.fallback {
            match self.driver.inspect(element.handle).await {
                Ok(info) => {
                    if let Some(value) = info.attribute(&fallback.attribute) {
                        let value = value.trim().to_ascii_lowercase();
                        if let Some(state) = fallback
                            .values
                            .iter()
                            .find(|(expected, _)| expected.to_ascii_lowercase() == value)
                            .map(|(_, state)| *state)
                        {
                            return state;
                        }
                    }
                }
                Err(e) => debug!("{}: fallback inspect failed: {}", element.target, e),
            }
        }

        ElementState::Unknown
    }

    async fn read_payload(&self, node: NodeHandle, payload: &Payload) -> Result<Option<String>> {
        match payload {
            Payload::InnerHtml => self.driver.inner_html(node).await.map(Some),
            Payload::Text => Ok(Some(self.driver.inspect(node).await?.normalized_text())),
            Payload::Attribute { name } => {
                let info = self.driver.inspect(node).await?;
                Ok(info.attribute(name).map(str::to_string))
            }
        }
    }
}
