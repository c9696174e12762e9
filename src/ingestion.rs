// 🧅 Ingestion Pipeline - fetch → dedup → enrich → persist
//
// One cycle = one feed fetch. Every record created in a cycle shares the
// cycle's snapshot timestamp. Records are only ever created, never updated.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::sources::{build_http_client, CountryLookup, HttpFeed, IpInfoLookup, SourceFetcher};
use crate::store::{AddressStore, InsertOutcome, NewAddressRecord};

// ============================================================================
// CYCLE REPORT
// ============================================================================

/// What one ingestion cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Lines returned by the feed, duplicates included
    pub fetched: usize,

    /// New records written
    pub created: usize,

    /// Addresses already in the store (including in-cycle repeats)
    pub already_present: usize,

    /// Addresses skipped because the country lookup failed
    pub lookup_failures: usize,

    /// Addresses skipped because the store rejected the check or the write
    pub store_failures: usize,
}

/// Snapshot time for a cycle, at the resolution the store persists.
pub fn snapshot_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct IngestionPipeline {
    fetcher: Arc<dyn SourceFetcher>,
    lookup: Arc<dyn CountryLookup>,
    store: Arc<dyn AddressStore>,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        lookup: Arc<dyn CountryLookup>,
        store: Arc<dyn AddressStore>,
    ) -> Self {
        Self {
            fetcher,
            lookup,
            store,
        }
    }

    /// Wire the HTTP feed and ipinfo lookup described by `config`.
    pub fn from_config(config: &Config, store: Arc<dyn AddressStore>) -> anyhow::Result<Self> {
        let http = build_http_client(config.http_timeout)?;

        Ok(Self::new(
            Arc::new(HttpFeed::new(http.clone(), config.feed_url.clone())),
            Arc::new(IpInfoLookup::new(http, config.lookup_url.clone())),
            store,
        ))
    }

    /// Run one cycle stamped with the current time.
    ///
    /// A failed fetch aborts the cycle before anything is written.
    pub async fn run_once(&self) -> Result<CycleReport, TransportError> {
        let lines = self.fetcher.fetch().await?;
        Ok(self.ingest(&lines, snapshot_now()).await)
    }

    /// Process an already-fetched list with an explicit snapshot time.
    pub async fn ingest(&self, addresses: &[String], snapshot: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport {
            fetched: addresses.len(),
            ..Default::default()
        };

        for address in addresses {
            // Check per item: an earlier copy in this same list may just have been inserted
            match self.store.contains_address(address) {
                Ok(true) => {
                    report.already_present += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(address = %address, error = %e, "store lookup failed, skipping");
                    report.store_failures += 1;
                    continue;
                }
            }

            let country = match self.lookup.lookup(address).await {
                Ok(country) => country.trim().to_string(),
                Err(e) => {
                    warn!(address = %address, error = %e, "country lookup failed, skipping");
                    report.lookup_failures += 1;
                    continue;
                }
            };

            let record = NewAddressRecord {
                address: address.clone(),
                country_code: country,
                ingested_at: snapshot,
            };

            match self.store.insert_address(&record) {
                Ok(InsertOutcome::Inserted(id)) => {
                    debug!(
                        id,
                        address = %record.address,
                        country = %record.country_code,
                        "exit node stored"
                    );
                    report.created += 1;
                }
                Ok(InsertOutcome::Duplicate) => report.already_present += 1,
                Err(e) => {
                    warn!(address = %address, error = %e, "failed to store exit node, skipping");
                    report.store_failures += 1;
                }
            }
        }

        report
    }
}

#[async_trait::async_trait]
impl crate::scheduler::PeriodicTask for IngestionPipeline {
    fn name(&self) -> &str {
        "exit-node ingestion"
    }

    async fn run(&self) {
        match self.run_once().await {
            Ok(report) => info!(
                fetched = report.fetched,
                created = report.created,
                already_present = report.already_present,
                lookup_failures = report.lookup_failures,
                store_failures = report.store_failures,
                "ingestion cycle complete"
            ),
            Err(e) => warn!(error = %e, "fetching exit nodes failed, cycle aborted"),
        }
    }
}
