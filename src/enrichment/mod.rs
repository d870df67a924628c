//! Batch enrichment of loaner records with order handover dates
//!
//! Rows are split into sequential batches of `batch_size`. Every lookup in a
//! batch runs concurrently and the batch ends at a [`join_all`] barrier; the
//! next batch starts only after every lookup of the previous one resolved.
//! Each task returns `(row_index, outcome)` and outcomes are written back
//! after the barrier, so tasks never share a row.
//!
//! Failures are per-record: a failed or empty lookup drops that row and the
//! run goes on. Surviving rows keep their input order.

mod lookup;
mod post_process;

pub use lookup::{HttpOrderLookup, LookupOutcome, OrderLookup, handover_date};
pub use post_process::{GLOBAL_RETAILER_CODE, post_process};

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::EnrichmentConfig;
use crate::records::{RecordCollection, VIN};
use crate::types::mask_vin;

/// Column holding the looked-up handover date
pub const IN_SERVICE_DATE: &str = "in_service_date";

/// Counts of one enrichment run
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    /// Size of each batch, in execution order
    pub batch_sizes: Vec<usize>,
    /// Rows that received a date
    pub enriched: usize,
    /// Rows whose order had no date
    pub no_date: usize,
    /// Rows whose lookup failed
    pub failed: usize,
    /// VINs of every dropped row, in input order
    pub dropped_vins: Vec<String>,
}

impl EnrichmentReport {
    /// Rows looked up
    pub fn total(&self) -> usize {
        self.enriched + self.no_date + self.failed
    }

    /// Rows removed for lacking a date
    pub fn dropped(&self) -> usize {
        self.no_date + self.failed
    }

    /// Fraction of lookups that failed outright
    pub fn failure_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.failed as f64 / total as f64,
        }
    }
}

/// Runs one [`OrderLookup`] per record in bounded batches
pub struct EnrichmentEngine {
    lookup: Arc<dyn OrderLookup>,
    batch_size: usize,
    failure_warn_ratio: f64,
}

impl EnrichmentEngine {
    /// Engine using `lookup` with the configured batch size
    pub fn new(lookup: Arc<dyn OrderLookup>, config: &EnrichmentConfig) -> Self {
        Self {
            lookup,
            batch_size: config.batch_size.max(1),
            failure_warn_ratio: config.failure_warn_ratio,
        }
    }

    /// Fill `in_service_date` and remove the rows that did not get one
    pub async fn enrich(&self, records: &mut RecordCollection) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        let total = records.len();
        let vins: Vec<String> = (0..total)
            .map(|row| records.get_str(row, VIN).unwrap_or_default().to_string())
            .collect();

        records.ensure_column(IN_SERVICE_DATE);
        let mut keep = vec![false; total];

        for (batch_no, start) in (0..total).step_by(self.batch_size).enumerate() {
            let end = (start + self.batch_size).min(total);
            report.batch_sizes.push(end - start);
            tracing::debug!(batch = batch_no + 1, start, end, "Starting enrichment batch");

            let lookup = self.lookup.as_ref();
            let tasks = (start..end).map(|row| {
                let vin = vins[row].as_str();
                async move {
                    if vin.is_empty() {
                        return (row, LookupOutcome::NoDate);
                    }
                    (row, lookup.lookup(vin).await)
                }
            });
            let outcomes = join_all(tasks).await;

            for (row, outcome) in outcomes {
                match outcome {
                    LookupOutcome::Found(date) => {
                        records.set(row, IN_SERVICE_DATE, Value::String(date));
                        keep[row] = true;
                        report.enriched += 1;
                    }
                    LookupOutcome::NoDate => {
                        tracing::debug!(vin = %mask_vin(&vins[row]), "No handover date");
                        report.no_date += 1;
                    }
                    LookupOutcome::Failed(cause) => {
                        tracing::warn!(
                            vin = %mask_vin(&vins[row]),
                            error = %cause,
                            lookup = self.lookup.name(),
                            "Order lookup failed"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        report.dropped_vins = (0..total)
            .filter(|&row| !keep[row])
            .map(|row| vins[row].clone())
            .collect();
        records.retain_rows(|row| keep[row]);

        let masked: Vec<String> = report.dropped_vins.iter().map(|v| mask_vin(v)).collect();
        tracing::info!(
            total,
            enriched = report.enriched,
            dropped = report.dropped(),
            dropped_vins = ?masked,
            batches = report.batch_sizes.len(),
            "Enrichment complete"
        );
        if report.failure_ratio() > self.failure_warn_ratio {
            tracing::warn!(
                failed = report.failed,
                total,
                ratio = report.failure_ratio(),
                threshold = self.failure_warn_ratio,
                "Order lookup failure ratio above threshold, output may reflect an outage"
            );
        }
        report
    }
}
