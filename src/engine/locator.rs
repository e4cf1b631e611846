//! Resolution of [`Target`]s against the live page.

use super::target::{Strategy, Target};
use crate::core::config::TimingConfig;
use crate::core::PageDriver;
use crate::errors::Result;
use crate::types::NodeHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Where a query is rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Page,
    Within(NodeHandle),
}

impl Scope {
    fn handle(&self) -> Option<NodeHandle> {
        match self {
            Scope::Page => None,
            Scope::Within(node) => Some(*node),
        }
    }
}

impl From<&Found> for Scope {
    fn from(found: &Found) -> Self {
        Scope::Within(found.handle)
    }
}

/// A live match for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub target: String,
    pub handle: NodeHandle,
    /// Index of the strategy that produced the match; anything above zero
    /// is a fallback.
    pub strategy_index: usize,
}

impl Found {
    pub fn is_fallback(&self) -> bool {
        self.strategy_index > 0
    }
}

/// Result of resolving a target. `NotFound` is an ordinary outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedElement {
    Found(Found),
    NotFound { target: String },
}

impl ResolvedElement {
    pub fn found(&self) -> Option<&Found> {
        match self {
            ResolvedElement::Found(found) => Some(found),
            ResolvedElement::NotFound { .. } => None,
        }
    }

    pub fn into_found(self) -> Option<Found> {
        match self {
            ResolvedElement::Found(found) => Some(found),
            ResolvedElement::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.found().is_some()
    }

    pub fn target_name(&self) -> &str {
        match self {
            ResolvedElement::Found(found) => &found.target,
            ResolvedElement::NotFound { target } => target,
        }
    }
}

pub struct Locator<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    timing: &'a TimingConfig,
}

impl<'a, D: PageDriver + ?Sized> Locator<'a, D> {
    pub fn new(driver: &'a D, timing: &'a TimingConfig) -> Self {
        Self { driver, timing }
    }

    /// First satisfying element of the first strategy, in declared order.
    pub async fn resolve(&self, target: &Target, scope: Scope) -> ResolvedElement {
        for (index, strategy) in target.strategies.iter().enumerate() {
            let nodes = match self.run_strategy(strategy, scope).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    debug!("{}: strategy {} ({}) failed: {}", target.name, index, strategy, e);
                    continue;
                }
            };
            for node in nodes {
                if self.satisfies(target, node).await {
                    return ResolvedElement::Found(Found {
                        target: target.name.clone(),
                        handle: node,
                        strategy_index: index,
                    });
                }
            }
        }
        ResolvedElement::NotFound {
            target: target.name.clone(),
        }
    }

    /// Every satisfying element of the first strategy that yields any.
    pub async fn resolve_all(&self, target: &Target, scope: Scope) -> Vec<Found> {
        for (index, strategy) in target.strategies.iter().enumerate() {
            let nodes = match self.run_strategy(strategy, scope).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    debug!("{}: strategy {} ({}) failed: {}", target.name, index, strategy, e);
                    continue;
                }
            };
            let mut matched = Vec::new();
            for node in nodes {
                if self.satisfies(target, node).await {
                    matched.push(Found {
                        target: target.name.clone(),
                        handle: node,
                        strategy_index: index,
                    });
                }
            }
            if !matched.is_empty() {
                debug!(
                    "{}: {} match(es) via strategy {} ({})",
                    target.name,
                    matched.len(),
                    index,
                    strategy
                );
                return matched;
            }
        }
        Vec::new()
    }

    /// Poll `resolve` until it finds the target or `timeout` elapses. Expiry
    /// yields `NotFound`, the same as a single miss.
    pub async fn wait_for(&self, target: &Target, scope: Scope, timeout: Duration) -> ResolvedElement {
        let deadline = Instant::now() + timeout;
        loop {
            let resolved = self.resolve(target, scope).await;
            if resolved.is_found() || Instant::now() >= deadline {
                return resolved;
            }
            tokio::time::sleep(self.timing.poll_interval()).await;
        }
    }

    /// Try each readiness target in turn with its own bounded wait.
    pub async fn wait_for_any(&self, targets: &[Target], timeout: Duration) -> Option<Found> {
        for target in targets {
            if let Some(found) = self.wait_for(target, Scope::Page, timeout).await.into_found() {
                return Some(found);
            }
            debug!("readiness target {} not found within {:?}", target.name, timeout);
        }
        None
    }

    pub async fn is_present(&self, target: &Target) -> bool {
        self.resolve(target, Scope::Page).await.is_found()
    }

    async fn run_strategy(&self, strategy: &Strategy, scope: Scope) -> Result<Vec<NodeHandle>> {
        let query = strategy.to_query()?;
        self.driver.query(scope.handle(), &query).await
    }

    async fn satisfies(&self, target: &Target, node: NodeHandle) -> bool {
        match self.driver.inspect(node).await {
            Ok(info) => target.predicate.accepts(&info),
            Err(e) => {
                debug!("{}: could not inspect {}: {}", target.name, node, e);
                false
            }
        }
    }
}
