//! Logical targets and the strategies used to find them.

use crate::core::Query;
use crate::errors::{Result, ScrapeError};
use crate::types::ElementInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a strategy's query string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMethod {
    Css,
    #[serde(rename = "xpath")]
    XPath,
    /// Bare tag name, e.g. `h3`.
    Tag,
    /// Space separated class list; the element must carry all of them.
    ExactClass,
    /// `name*=value`, or a bare `value` which is matched against `class`.
    AttrContains,
    /// ARIA role.
    Role,
    /// Element with an own text node containing the query.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub method: SelectionMethod,
    pub query: String,
}

impl Strategy {
    pub fn new(method: SelectionMethod, query: impl Into<String>) -> Self {
        Self {
            method,
            query: query.into(),
        }
    }

    /// Translate into a query the driver can run, relative to its scope.
    pub fn to_query(&self) -> Result<Query> {
        let q = self.query.trim();
        if q.is_empty() {
            return Err(ScrapeError::QueryFailed(format!(
                "empty {:?} strategy",
                self.method
            )));
        }
        let query = match self.method {
            SelectionMethod::Css => Query::Css(q.to_string()),
            SelectionMethod::XPath => Query::XPath(q.to_string()),
            SelectionMethod::Tag => {
                if !q.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    return Err(ScrapeError::QueryFailed(format!("invalid tag name `{}`", q)));
                }
                Query::Css(q.to_ascii_lowercase())
            }
            SelectionMethod::ExactClass => Query::Css(
                q.split_whitespace()
                    .map(|class| format!(".{}", css_escape_ident(class)))
                    .collect(),
            ),
            SelectionMethod::AttrContains => {
                let (name, value) = match q.split_once("*=") {
                    Some((name, value)) => (name.trim(), value.trim()),
                    None => ("class", q),
                };
                if name.is_empty() || value.is_empty() {
                    return Err(ScrapeError::QueryFailed(format!(
                        "invalid attribute pattern `{}`",
                        q
                    )));
                }
                Query::Css(format!(
                    "[{}*=\"{}\"]",
                    css_escape_ident(name),
                    css_escape_string(value)
                ))
            }
            SelectionMethod::Role => Query::Css(format!("[role=\"{}\"]", css_escape_string(q))),
            SelectionMethod::Text => Query::XPath(format!(
                ".//*[text()[contains(normalize-space(.), {})]]",
                xpath_literal(q)
            )),
        };
        Ok(query)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.method, self.query)
    }
}

/// Conditions a candidate must meet besides matching the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Predicate {
    pub visible: bool,
    pub enabled: bool,
    pub non_empty_text: bool,
    pub min_text_len: Option<usize>,
}

impl Default for Predicate {
    fn default() -> Self {
        Self {
            visible: true,
            enabled: false,
            non_empty_text: false,
            min_text_len: None,
        }
    }
}

impl Predicate {
    /// Accept anything the query matched, rendered or not.
    pub fn any() -> Self {
        Self {
            visible: false,
            ..Default::default()
        }
    }

    pub fn accepts(&self, info: &ElementInfo) -> bool {
        if self.visible && !info.is_visible {
            return false;
        }
        if self.enabled && !info.is_enabled {
            return false;
        }
        let text = info.normalized_text();
        if self.non_empty_text && text.is_empty() {
            return false;
        }
        if let Some(min) = self.min_text_len {
            if text.chars().count() < min {
                return false;
            }
        }
        true
    }
}

/// Something to find on a page, with fallbacks in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub name: String,
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub predicate: Predicate,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategies: Vec::new(),
            predicate: Predicate::default(),
        }
    }

    pub fn with(mut self, method: SelectionMethod, query: impl Into<String>) -> Self {
        self.strategies.push(Strategy::new(method, query));
        self
    }

    pub fn css(self, query: impl Into<String>) -> Self {
        self.with(SelectionMethod::Css, query)
    }

    pub fn require(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn requires_text(mut self) -> Self {
        self.predicate.non_empty_text = true;
        self
    }
}

fn css_escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, c) in ident.chars().enumerate() {
        let plain = c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii();
        if plain && !(i == 0 && c.is_ascii_digit()) {
            out.push(c);
        } else if c.is_ascii_digit() {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

fn css_escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{}\"", value)
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        let parts: Vec<String> = value.split('"').map(|p| format!("\"{}\"", p)).collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn css(method: SelectionMethod, q: &str) -> String {
        match Strategy::new(method, q).to_query().unwrap() {
            Query::Css(s) => s,
            other => panic!("expected css, got {:?}", other),
        }
    }

    #[test]
    fn exact_class_requires_every_class() {
        assert_eq!(css(SelectionMethod::ExactClass, "sc-hEJUTg ceCyPE"), ".sc-hEJUTg.ceCyPE");
    }

    #[test]
    fn exact_class_escapes_leading_digit_and_colon() {
        assert_eq!(css(SelectionMethod::ExactClass, "md:flex"), ".md\\:flex");
        assert_eq!(css(SelectionMethod::ExactClass, "2col"), ".\\32 col");
    }

    #[test]
    fn attr_contains_defaults_to_class() {
        assert_eq!(css(SelectionMethod::AttrContains, "price"), "[class*=\"price\"]");
        assert_eq!(
            css(SelectionMethod::AttrContains, "data-testid*=NGST_QA"),
            "[data-testid*=\"NGST_QA\"]"
        );
    }

    #[test]
    fn role_and_tag() {
        assert_eq!(css(SelectionMethod::Role, "button"), "[role=\"button\"]");
        assert_eq!(css(SelectionMethod::Tag, "H3"), "h3");
        assert!(Strategy::new(SelectionMethod::Tag, "h3 > a").to_query().is_err());
    }

    #[test]
    fn text_becomes_relative_xpath() {
        let q = Strategy::new(SelectionMethod::Text, "No Thanks").to_query().unwrap();
        assert_eq!(
            q,
            Query::XPath(".//*[text()[contains(normalize-space(.), \"No Thanks\")]]".into())
        );
    }

    #[test]
    fn xpath_literal_handles_both_quote_kinds() {
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(xpath_literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(xpath_literal("a\"b'c"), "concat(\"a\", '\"', \"b'c\")");
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(Strategy::new(SelectionMethod::Css, "  ").to_query().is_err());
        assert!(Strategy::new(SelectionMethod::AttrContains, "href*=").to_query().is_err());
    }

    #[test]
    fn predicate_filters_on_text_and_state() {
        let info = ElementInfo {
            text_content: " Kicks ".into(),
            is_visible: true,
            is_enabled: false,
            ..Default::default()
        };
        assert!(Predicate::default().accepts(&info));
        assert!(!Predicate { enabled: true, ..Default::default() }.accepts(&info));
        assert!(!Predicate { min_text_len: Some(10), ..Default::default() }.accepts(&info));

        let hidden = ElementInfo::default();
        assert!(!Predicate::default().accepts(&hidden));
        assert!(Predicate::any().accepts(&hidden));
    }

    #[test]
    fn target_deserializes_with_default_predicate() {
        let target: Target = serde_json::from_str(
            r#"{ "strategies": [ { "method": "exact-class", "query": "X" },
                                 { "method": "attr-contains", "query": "price" } ] }"#,
        )
        .unwrap();
        assert_eq!(target.strategies.len(), 2);
        assert_eq!(target.strategies[1].method, SelectionMethod::AttrContains);
        assert!(target.predicate.visible);
    }
}
