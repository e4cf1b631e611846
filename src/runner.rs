//! Drives a whole run: one unit of work per seed, a checkpoint after each.

use crate::core::{Config, PageDriver};
use crate::engine::{DismissOutcome, ExtractedRecord, ExtractionAccumulator, Interactor, Locator, SeenSet};
use crate::errors::{Result, ScrapeError};
use crate::profile::CompiledProfile;
use crate::seeds::{Seed, SeedSkip, VisitedAddresses};
use crate::store::{ResultStore, UnitStatus, UnitSummary};
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub records: usize,
}

pub struct Runner<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    config: &'a Config,
    profile: &'a CompiledProfile,
}

impl<'a, D: PageDriver + ?Sized> Runner<'a, D> {
    pub fn new(driver: &'a D, config: &'a Config, profile: &'a CompiledProfile) -> Self {
        Self {
            driver,
            config,
            profile,
        }
    }

    /// Process `seeds` in order until done or until `shutdown` resolves.
    ///
    /// On shutdown the unit in flight is abandoned; everything up to the last
    /// checkpoint stays on disk and the report covers the completed units.
    pub async fn run<F>(&self, seeds: &[Seed], store: &mut ResultStore, shutdown: F) -> Result<RunStats>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            stats = self.process(seeds, store) => stats,
            _ = shutdown => Err(ScrapeError::Interrupted),
        };

        match outcome {
            Ok(stats) => {
                store.finish().await?;
                info!(
                    "Run complete: {} completed, {} failed, {} skipped, {} records",
                    stats.completed, stats.failed, stats.skipped, stats.records
                );
                Ok(stats)
            }
            Err(e) => {
                warn!("Run stopped: {}", e);
                if let Err(report_err) = store.finish().await {
                    error!("Could not write report: {}", report_err);
                }
                Err(e)
            }
        }
    }

    async fn process(&self, seeds: &[Seed], store: &mut ResultStore) -> Result<RunStats> {
        let mut stats = RunStats::default();
        let mut visited = VisitedAddresses::default();

        for (idx, seed) in seeds.iter().enumerate() {
            let label = seed.display_label();
            let address = match visited.claim(seed) {
                Ok(address) => address,
                Err(skip) => {
                    let reason = match skip {
                        SeedSkip::NoAddress => "no address",
                        SeedSkip::AlreadyProcessed => "already processed",
                    };
                    info!("{:3}. Skipping {}: {}", idx + 1, label, reason);
                    stats.skipped += 1;
                    store
                        .commit_unit(UnitSummary::skipped(label, seed.address.clone(), reason), vec![])
                        .await?;
                    continue;
                }
            };

            info!("{:3}. Processing {} ({})", idx + 1, label, address);
            let (summary, records) = self.run_unit(seed, &address, store).await;
            match &summary.status {
                UnitStatus::Completed => stats.completed += 1,
                UnitStatus::Failed { error } => {
                    error!("{:3}. {} failed: {}", idx + 1, label, error);
                    stats.failed += 1;
                }
                UnitStatus::Skipped { .. } => stats.skipped += 1,
            }
            stats.records += records.len();
            store.commit_unit(summary, records).await?;
        }
        Ok(stats)
    }

    async fn run_unit(
        &self,
        seed: &Seed,
        address: &str,
        store: &ResultStore,
    ) -> (UnitSummary, Vec<ExtractedRecord>) {
        let timing = &self.config.timing;
        let label = seed.display_label();
        let mut summary = UnitSummary::new(label, Some(address.to_string()), UnitStatus::Completed);

        if let Err(e) = self.driver.navigate(address).await {
            summary.status = UnitStatus::Failed { error: e.to_string() };
            summary.finished_at = Utc::now();
            return (summary, Vec::new());
        }
        if timing.navigation_settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(timing.navigation_settle_ms)).await;
        }

        let interactor = Interactor::new(self.driver, timing);
        let locator = Locator::new(self.driver, timing);
        let obstruction = &self.profile.obstruction;

        interactor.accept_consent(obstruction).await;
        if !self.profile.readiness.is_empty()
            && locator
                .wait_for_any(&self.profile.readiness, timing.wait_timeout())
                .await
                .is_none()
        {
            warn!("{}: page never signalled readiness, continuing", label);
        }
        if interactor.dismiss_obstructions(obstruction).await == DismissOutcome::Persistent {
            summary.persistent_obstructions += 1;
        }
        if self.profile.scroll {
            if let Err(e) = interactor.scroll_gradually().await {
                warn!("{}: gradual scroll failed: {}", label, e);
            }
        }

        if let Some(path) = self.screenshot(store, label, "before").await {
            summary.screenshots.push(path);
        }

        let accumulator =
            ExtractionAccumulator::new(self.driver, timing, obstruction, &self.profile.prohibition);
        let mut seen = SeenSet::new();
        let result = accumulator.run_unit(label, &self.profile.plan, &mut seen).await;

        if let Some(path) = self.screenshot(store, label, "after").await {
            summary.screenshots.push(path);
        }

        let mut records = result.records;
        for record in &mut records {
            record.seed = seed.metadata.clone();
        }

        summary.cards = result.tally;
        summary.prep = result.prep;
        summary.persistent_obstructions += result.persistent_obstructions;
        summary.reduce(&self.profile.summary, &records);
        summary.finished_at = Utc::now();
        (summary, records)
    }

    async fn screenshot(&self, store: &ResultStore, label: &str, stage: &str) -> Option<PathBuf> {
        if !self.config.output.screenshots {
            return None;
        }
        let saved = match self.driver.screenshot().await {
            Ok(png) => store.save_screenshot(label, stage, &png).await,
            Err(e) => Err(e),
        };
        match saved {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("{}: {} screenshot failed: {}", label, stage, e);
                None
            }
        }
    }
}
