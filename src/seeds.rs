use crate::errors::{Result, ScrapeError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// One unit of work: a page to visit plus whatever metadata the discovery
/// pass recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default, alias = "name", alias = "car_name")]
    pub label: String,
    #[serde(default, alias = "url", alias = "page_link")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Seed {
    pub fn new(label: &str, address: &str) -> Self {
        Self {
            label: label.to_string(),
            address: Some(address.to_string()),
            metadata: BTreeMap::new(),
        }
    }

    /// Label for logs and reports; falls back to the address.
    pub fn display_label(&self) -> &str {
        if !self.label.trim().is_empty() {
            &self.label
        } else {
            self.address.as_deref().unwrap_or("<unnamed>")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSkip {
    NoAddress,
    AlreadyProcessed,
}

pub fn load(path: &Path) -> Result<Vec<Seed>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| ScrapeError::ConfigurationError(format!("{}: {}", path.display(), e)))
}

/// Addresses already visited in this run.
#[derive(Debug, Default)]
pub struct VisitedAddresses {
    seen: HashSet<String>,
}

impl VisitedAddresses {
    /// Claim the seed's address, or say why it must be skipped.
    pub fn claim(&mut self, seed: &Seed) -> std::result::Result<String, SeedSkip> {
        let address = seed
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(SeedSkip::NoAddress)?;
        if !self.seen.insert(address.to_string()) {
            return Err(SeedSkip::AlreadyProcessed);
        }
        Ok(address.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_discovery_output_keys() {
        let seeds: Vec<Seed> = serde_json::from_str(
            r#"[ { "car_name": "2025 Civic Sport", "page_link": "https://example.test/build/sport",
                   "year": "2025", "price": "$24,990" },
                 { "label": "no link" } ]"#,
        )
        .unwrap();
        assert_eq!(seeds[0].label, "2025 Civic Sport");
        assert_eq!(seeds[0].address.as_deref(), Some("https://example.test/build/sport"));
        assert_eq!(seeds[0].metadata["year"], "2025");
        assert!(seeds[1].address.is_none());
    }

    #[test]
    fn claims_each_address_once() {
        let mut visited = VisitedAddresses::default();
        let a = Seed::new("A", "https://example.test/a");
        let blank = Seed::new("B", "  ");
        assert_eq!(visited.claim(&a), Ok("https://example.test/a".to_string()));
        assert_eq!(visited.claim(&a), Err(SeedSkip::AlreadyProcessed));
        assert_eq!(visited.claim(&blank), Err(SeedSkip::NoAddress));
    }

    #[test]
    fn loads_bundled_seed_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("seeds/example.json");
        let seeds = load(&path).unwrap();
        assert_eq!(seeds.len(), 3);
        assert_eq!(seeds[1].label, "2025 Crossover");
        assert!(seeds[2].address.is_none());
    }

    #[test]
    fn display_label_falls_back_to_address() {
        let seed = Seed::new("", "https://example.test/a");
        assert_eq!(seed.display_label(), "https://example.test/a");
    }
}
