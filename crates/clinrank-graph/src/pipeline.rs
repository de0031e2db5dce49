//! Metrics run: load the graph, compute metrics, persist them to the sidecar.
//!
//! Store calls run under a deadline. When persisting times out, records
//! already written stay in the sidecar and the summary reports how many made
//! it; nothing is rolled back.
//!
//! Concepts the engine rejects get a tombstone in the sidecar, so a record
//! from an earlier run cannot keep feeding scores for a concept that is now
//! part of a cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::ConceptId;
use clinrank_storage::{GraphStore, MetricSidecar};

use crate::centrality::Convergence;
use crate::metrics::MetricsEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// The persist deadline passed before every record was written.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub concept_id: ConceptId,
    pub reason: String,
}

/// What a metrics run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Distinct concepts in the snapshot.
    pub concepts: usize,
    /// Records produced by the engine.
    pub computed: usize,
    /// Records acknowledged by the sidecar.
    pub written: usize,
    /// Concepts without a persisted record: malformed hierarchy or write errors.
    pub failures: Vec<FailureSummary>,
    /// Failed concepts whose record from an earlier run was retired.
    pub retired: usize,
    pub convergence: Convergence,
    pub authority_version: u32,
}

pub struct MetricsPipeline {
    graph: Arc<dyn GraphStore>,
    sidecar: Arc<dyn MetricSidecar>,
    engine: Arc<MetricsEngine>,
    io_timeout: Duration,
}

impl MetricsPipeline {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        sidecar: Arc<dyn MetricSidecar>,
        engine: Arc<MetricsEngine>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            graph,
            sidecar,
            engine,
            io_timeout,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "Metrics run started");

        let deadline = Instant::now() + self.io_timeout;
        let (concepts, relationships, ancestors) = timeout_at(deadline, async {
            tokio::try_join!(
                self.graph.load_concepts(),
                self.graph.load_relationships(),
                self.graph.load_ancestors(),
            )
        })
        .await
        .map_err(|_| ClinrankError::Timeout("graph load".to_string()))??;

        let engine = Arc::clone(&self.engine);
        let report = tokio::task::spawn_blocking(move || {
            engine.compute(&concepts, &relationships, &ancestors)
        })
        .await
        .map_err(|e| ClinrankError::Task(format!("Metrics computation panicked: {}", e)))??;

        let rejected: Vec<ConceptId> = report.failures.iter().map(|f| f.concept_id).collect();
        let mut failures: Vec<FailureSummary> = report
            .failures
            .iter()
            .map(|f| FailureSummary {
                concept_id: f.concept_id,
                reason: f.error.to_string(),
            })
            .collect();
        let computed = report.records.len();
        let concepts = computed + report.failures.len();

        let deadline = Instant::now() + self.io_timeout;
        let mut written = 0;
        let mut status = RunStatus::Completed;
        for record in report.records {
            let concept_id = record.concept_id;
            match timeout_at(deadline, self.sidecar.upsert_metric(concept_id, record)).await {
                Ok(Ok(_revision)) => written += 1,
                Ok(Err(error)) => {
                    warn!(%run_id, %concept_id, %error, "Failed to persist metric record");
                    failures.push(FailureSummary {
                        concept_id,
                        reason: error.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        %run_id,
                        written,
                        remaining = computed - written,
                        "Metric persistence timed out; written records are kept"
                    );
                    status = RunStatus::TimedOut;
                    break;
                }
            }
        }

        let mut retired = 0;
        if status == RunStatus::Completed {
            for concept_id in rejected {
                match timeout_at(deadline, self.sidecar.retire_metric(concept_id)).await {
                    Ok(Ok(Some(revision))) => {
                        info!(%run_id, %concept_id, revision, "Retired stale metric record");
                        retired += 1;
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(error)) => {
                        warn!(%run_id, %concept_id, %error, "Failed to retire metric record");
                    }
                    Err(_) => {
                        warn!(%run_id, retired, "Metric retirement timed out");
                        status = RunStatus::TimedOut;
                        break;
                    }
                }
            }
        }
        failures.sort_by_key(|f| f.concept_id);

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            concepts,
            computed,
            written,
            failures,
            retired,
            convergence: report.convergence,
            authority_version: report.authority_version,
        };
        info!(
            %run_id,
            concepts = summary.concepts,
            written = summary.written,
            failures = summary.failures.len(),
            retired = summary.retired,
            status = ?summary.status,
            "Metrics run finished"
        );
        Ok(summary)
    }
}
