use crate::types::ElementInfo;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

const STABLE_ATTRIBUTES: [(&str, &str); 3] = [("data-testid", "testid"), ("id", "id"), ("data-id", "data-id")];

/// Key used to recognise the same card across repeated discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Stable attributes, when the markup has any, joined with a digest of
    /// the visible text and integer screen position. Shared test ids alone
    /// never make two cards equal.
    pub fn of(info: &ElementInfo) -> Self {
        let mut parts: Vec<String> = STABLE_ATTRIBUTES
            .iter()
            .filter_map(|(attr, label)| info.attribute(attr).map(|v| format!("{}:{}", label, v.trim())))
            .collect();

        let (x, y) = info
            .rect
            .map(|r| (r.x.round() as i64, r.y.round() as i64))
            .unwrap_or((0, 0));
        let mut hasher = Sha256::new();
        hasher.update(info.normalized_text().as_bytes());
        hasher.update(format!("@{},{}", x, y).as_bytes());
        parts.push(format!("sha256:{:x}", hasher.finalize()));
        Self(parts.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity keys already processed in one unit of work.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: HashSet<IdentityKey>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as seen; false if it already was.
    pub fn mark(&mut self, key: &IdentityKey) -> bool {
        self.keys.insert(key.clone())
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementRect;
    use std::collections::HashMap;

    fn card(text: &str, x: f64, y: f64) -> ElementInfo {
        ElementInfo {
            tag_name: "div".into(),
            text_content: text.into(),
            rect: Some(ElementRect { x, y, width: 300.0, height: 120.0 }),
            is_visible: true,
            is_enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn stable_attributes_prefix_the_digest() {
        let mut info = card("SE Sedan", 0.0, 0.0);
        info.attributes = HashMap::from([
            ("data-testid".to_string(), "trim-se".to_string()),
            ("id".to_string(), "".to_string()),
        ]);
        let key = IdentityKey::of(&info);
        assert!(key.as_str().starts_with("testid:trim-se|sha256:"));
        assert_eq!(key, IdentityKey::of(&info));
    }

    #[test]
    fn shared_test_id_does_not_merge_cards() {
        let with_id = |text: &str, y: f64| {
            let mut info = card(text, 0.0, y);
            info.attributes = HashMap::from([("data-testid".to_string(), "trim-card".to_string())]);
            IdentityKey::of(&info)
        };
        let keys: HashSet<_> = [with_id("S", 0.0), with_id("SV", 120.0), with_id("SR", 240.0)]
            .into_iter()
            .collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn text_and_position_digest() {
        let a = IdentityKey::of(&card("SE  Sedan\n$21,520", 10.2, 300.4));
        let b = IdentityKey::of(&card("SE Sedan $21,520", 9.8, 299.6));
        let moved = IdentityKey::of(&card("SE Sedan $21,520", 10.0, 500.0));
        assert_eq!(a, b);
        assert_ne!(a, moved);
        assert!(a.as_str().starts_with("sha256:"));
    }

    #[test]
    fn seen_set_marks_once() {
        let key = IdentityKey::of(&card("SE", 0.0, 0.0));
        let mut seen = SeenSet::new();
        assert!(seen.mark(&key));
        assert!(!seen.mark(&key));
        assert!(seen.contains(&key));
        assert_eq!(seen.len(), 1);
    }
}
