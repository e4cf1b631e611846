//! Site profiles: every selector and field name for one website, as JSON.
//!
//! Plans refer to targets and rules by name; [`SiteProfile::compile`] checks
//! the references and produces the engine types.

use crate::engine::{
    ClassificationRule, CollectionPlan, Extract, ExtractionPlan, FieldScope, FieldSpec, Interaction,
    KeywordRule, ObstructionPolicy, PrepStep, Target,
};
use crate::errors::{Result, ScrapeError};
use crate::store::SummaryFields;
use crate::types::ElementState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
    #[serde(default)]
    pub rules: BTreeMap<String, ClassificationRule>,
    #[serde(default)]
    pub obstruction: ObstructionRefs,
    /// Cards and preparation buttons whose text contains one of these are
    /// never touched.
    #[serde(default)]
    pub prohibited: Vec<String>,
    /// Targets that signal the page is ready, tried in order.
    #[serde(default)]
    pub readiness: Vec<String>,
    /// Scroll the whole page once before extraction to trigger lazy loading.
    #[serde(default)]
    pub scroll: bool,
    #[serde(default)]
    pub plan: PlanDef,
    /// Fields each unit's summary keeps, and which prices it totals.
    #[serde(default)]
    pub summary: SummaryFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObstructionRefs {
    pub indicator: Option<String>,
    pub close_control: Option<String>,
    pub consent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanDef {
    #[serde(default)]
    pub prep: Vec<PrepDef>,
    #[serde(default)]
    pub collections: Vec<CollectionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepDef {
    pub target: String,
    pub rule: Option<String>,
    pub desired: Option<ElementState>,
    #[serde(default = "yes")]
    pub dismiss_after: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,
    pub card: String,
    pub interaction: Option<InteractionDef>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionDef {
    pub trigger: Option<String>,
    pub rule: String,
    pub desired: ElementState,
    #[serde(default = "yes")]
    pub dismiss_after: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub target: Option<String>,
    #[serde(default)]
    pub scope: FieldScope,
    #[serde(flatten)]
    pub extract: ExtractDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "extract", rename_all = "kebab-case")]
pub enum ExtractDef {
    Text,
    Attribute { attribute: String },
    Price,
    Year,
    FirstLine,
    SrcsetFirst,
    Url { attribute: String },
    Group { fields: Vec<FieldDef> },
    List { item: String, fields: Vec<FieldDef> },
}

/// A profile with every name reference replaced by what it names.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub name: String,
    pub plan: ExtractionPlan,
    pub obstruction: ObstructionPolicy,
    pub readiness: Vec<Target>,
    pub prohibition: KeywordRule,
    pub scroll: bool,
    pub summary: SummaryFields,
}

impl SiteProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|e| ScrapeError::ConfigurationError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let profile: SiteProfile = serde_json::from_str(raw)?;
        Ok(profile)
    }

    pub fn compile(&self) -> Result<CompiledProfile> {
        if self.name.trim().is_empty() {
            return Err(ScrapeError::ConfigurationError("profile name is empty".into()));
        }
        for (name, target) in &self.targets {
            if target.strategies.is_empty() {
                return Err(ScrapeError::ConfigurationError(format!(
                    "target `{}` has no strategies",
                    name
                )));
            }
        }

        let prep = self
            .plan
            .prep
            .iter()
            .map(|step| {
                Ok(PrepStep {
                    target: self.target(&step.target)?,
                    rule: step.rule.as_deref().map(|r| self.rule(r)).transpose()?,
                    desired: step.desired,
                    dismiss_after: step.dismiss_after,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let collections = self
            .plan
            .collections
            .iter()
            .map(|c| self.collection(c))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledProfile {
            name: self.name.clone(),
            plan: ExtractionPlan { prep, collections },
            obstruction: ObstructionPolicy {
                indicator: self.optional_target(&self.obstruction.indicator)?,
                close_control: self.optional_target(&self.obstruction.close_control)?,
                consent: self.optional_target(&self.obstruction.consent)?,
            },
            readiness: self
                .readiness
                .iter()
                .map(|name| self.target(name))
                .collect::<Result<Vec<_>>>()?,
            prohibition: KeywordRule::new(&self.prohibited),
            scroll: self.scroll,
            summary: self.summary.clone(),
        })
    }

    fn target(&self, name: &str) -> Result<Target> {
        let mut target = self
            .targets
            .get(name)
            .cloned()
            .ok_or_else(|| ScrapeError::ConfigurationError(format!("unknown target `{}`", name)))?;
        target.name = name.to_string();
        Ok(target)
    }

    fn optional_target(&self, name: &Option<String>) -> Result<Option<Target>> {
        name.as_deref().map(|n| self.target(n)).transpose()
    }

    fn rule(&self, name: &str) -> Result<ClassificationRule> {
        self.rules
            .get(name)
            .cloned()
            .ok_or_else(|| ScrapeError::ConfigurationError(format!("unknown rule `{}`", name)))
    }

    fn collection(&self, def: &CollectionDef) -> Result<CollectionPlan> {
        let interaction = match &def.interaction {
            Some(i) => Some(Interaction {
                trigger: self.optional_target(&i.trigger)?,
                rule: self.rule(&i.rule)?,
                desired: i.desired,
                dismiss_after: i.dismiss_after,
            }),
            None => None,
        };
        Ok(CollectionPlan {
            name: def.name.clone(),
            card: self.target(&def.card)?,
            interaction,
            fields: self.fields(&def.fields, true)?,
        })
    }

    fn fields(&self, defs: &[FieldDef], top_level: bool) -> Result<Vec<FieldSpec>> {
        defs.iter()
            .map(|def| {
                let extract = match &def.extract {
                    ExtractDef::Text => Extract::Text,
                    ExtractDef::Attribute { attribute } => Extract::Attribute(attribute.clone()),
                    ExtractDef::Price => Extract::Price,
                    ExtractDef::Year => Extract::Year,
                    ExtractDef::FirstLine => Extract::FirstLine,
                    ExtractDef::SrcsetFirst => Extract::SrcsetFirst,
                    ExtractDef::Url { attribute } => Extract::Url(attribute.clone()),
                    ExtractDef::Group { .. } | ExtractDef::List { .. } if !top_level => {
                        return Err(ScrapeError::ConfigurationError(format!(
                            "field `{}`: groups and lists cannot be nested",
                            def.name
                        )))
                    }
                    ExtractDef::Group { fields } => Extract::Group(self.fields(fields, false)?),
                    ExtractDef::List { item, fields } => Extract::List {
                        item: self.target(item)?,
                        fields: self.fields(fields, false)?,
                    },
                };
                if def.scope == FieldScope::Page && def.target.is_none() {
                    return Err(ScrapeError::ConfigurationError(format!(
                        "field `{}`: page scope needs a target",
                        def.name
                    )));
                }
                Ok(FieldSpec {
                    name: def.name.clone(),
                    target: self.optional_target(&def.target)?,
                    extract,
                    scope: def.scope,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
      "name": "civic",
      "targets": {
        "card":  { "strategies": [ { "method": "css", "query": ".trim-card" } ] },
        "name":  { "strategies": [ { "method": "tag", "query": "h3" } ] },
        "price": { "strategies": [ { "method": "exact-class", "query": "X" },
                                   { "method": "attr-contains", "query": "price" } ] },
        "toggle": { "strategies": [ { "method": "role", "query": "button" } ] },
        "swatch": { "strategies": [ { "method": "css", "query": ".swatch" } ] },
        "modal": { "strategies": [ { "method": "css", "query": ".modal" } ] },
        "ready": { "strategies": [ { "method": "css", "query": "main" } ] }
      },
      "rules": {
        "expanded": {
          "fallback": { "attribute": "aria-expanded",
                        "values": { "true": "expandable-expanded", "false": "expandable-collapsed" } }
        }
      },
      "obstruction": { "indicator": "modal" },
      "prohibited": ["compare", "share"],
      "readiness": ["ready"],
      "plan": {
        "prep": [ { "target": "toggle", "rule": "expanded", "desired": "expandable-expanded" } ],
        "collections": [ {
          "name": "trims",
          "card": "card",
          "interaction": { "trigger": "toggle", "rule": "expanded", "desired": "expandable-expanded" },
          "fields": [
            { "name": "name", "target": "name", "extract": "text" },
            { "name": "price", "target": "price", "extract": "price" },
            { "name": "id", "extract": "attribute", "attribute": "data-trim" },
            { "name": "colors", "extract": "list", "item": "swatch",
              "fields": [ { "name": "label", "extract": "text" } ] },
            { "name": "notice", "target": "modal", "scope": "page", "extract": "first-line" }
          ]
        } ]
      },
      "summary": { "fields": ["name"], "price_total": ["price", "colors.price"] }
    }"#;

    #[test]
    fn compiles_references() {
        let compiled = SiteProfile::from_json(PROFILE).unwrap().compile().unwrap();
        assert_eq!(compiled.readiness[0].name, "ready");
        assert_eq!(compiled.obstruction.indicator.as_ref().unwrap().name, "modal");
        assert!(compiled.obstruction.close_control.is_none());

        let prep = &compiled.plan.prep[0];
        assert!(prep.dismiss_after);
        assert_eq!(prep.desired, Some(ElementState::ExpandableExpanded));

        let trims = &compiled.plan.collections[0];
        assert_eq!(trims.card.name, "card");
        assert_eq!(trims.fields[1].target.as_ref().unwrap().strategies.len(), 2);
        assert_eq!(trims.fields[2].extract, Extract::Attribute("data-trim".into()));
        assert!(trims.fields[2].target.is_none());
        match &trims.fields[3].extract {
            Extract::List { item, fields } => {
                assert_eq!(item.name, "swatch");
                assert_eq!(fields[0].extract, Extract::Text);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(trims.fields[0].scope, FieldScope::Card);
        assert_eq!(trims.fields[4].scope, FieldScope::Page);
        assert_eq!(trims.fields[4].extract, Extract::FirstLine);
        assert_eq!(compiled.summary.fields, vec!["name".to_string()]);
        assert_eq!(compiled.summary.price_total.len(), 2);
    }

    #[test]
    fn page_scoped_field_needs_a_target() {
        let raw = PROFILE.replace(
            r#"{ "name": "notice", "target": "modal", "scope": "page""#,
            r#"{ "name": "notice", "scope": "page""#,
        );
        let err = SiteProfile::from_json(&raw).unwrap().compile().unwrap_err();
        assert!(matches!(err, ScrapeError::ConfigurationError(ref m) if m.contains("notice")));
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        let raw = PROFILE.replace(r#""card": "card""#, r#""card": "tile""#);
        let err = SiteProfile::from_json(&raw).unwrap().compile().unwrap_err();
        assert!(matches!(err, ScrapeError::ConfigurationError(ref m) if m.contains("tile")));

        let raw = PROFILE.replace(r#""rule": "expanded", "desired""#, r#""rule": "open", "desired""#);
        assert!(SiteProfile::from_json(&raw).unwrap().compile().is_err());
    }

    #[test]
    fn nested_lists_are_rejected() {
        let raw = PROFILE.replace(
            r#"[ { "name": "label", "extract": "text" } ]"#,
            r#"[ { "name": "inner", "extract": "list", "item": "swatch", "fields": [] } ]"#,
        );
        assert!(SiteProfile::from_json(&raw).unwrap().compile().is_err());
    }

    #[test]
    fn bundled_example_compiles() {
        let compiled = SiteProfile::from_json(include_str!("../profiles/example.json"))
            .unwrap()
            .compile()
            .unwrap();
        assert_eq!(compiled.plan.collections.len(), 2);
        assert!(compiled.plan.prep[0].rule.is_none());
        assert!(compiled.plan.collections[1].interaction.as_ref().unwrap().trigger.is_none());
        assert_eq!(compiled.plan.collections[1].fields[3].scope, FieldScope::Page);
        assert_eq!(compiled.summary.price_total, vec!["price".to_string()]);
        assert!(compiled.scroll);
    }

    #[test]
    fn empty_target_is_rejected() {
        let raw = PROFILE.replace(
            r#""ready": { "strategies": [ { "method": "css", "query": "main" } ] }"#,
            r#""ready": { "strategies": [] }"#,
        );
        assert!(SiteProfile::from_json(&raw).unwrap().compile().is_err());
    }
}
