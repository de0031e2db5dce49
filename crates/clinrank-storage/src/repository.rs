//! SQLite-backed metric sidecar and relevance store.
//!
//! Metric rows are append-only: each changed record becomes a new revision,
//! and retiring a concept appends a row flagged `retired`. Relevance scores
//! are stored as a single JSON payload per (concept, domain) and replaced with
//! one version-guarded statement.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::{ConceptId, MetricRecord, RelevanceScore, Versioned};

use crate::db::Database;
use crate::store::{MetricSidecar, RelevanceStore};

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> ClinrankError + '_ {
    move |e| ClinrankError::Storage(format!("{}: {}", context, e))
}

/// Metric sidecar and relevance store on one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// All stored revisions for a concept, oldest first; tombstones are `None`.
    pub fn metric_history(
        &self,
        concept_id: ConceptId,
    ) -> Result<Vec<Versioned<Option<MetricRecord>>>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT concept_id, revision, centrality, depth, authority,
                            schema_version, authority_version, centrality_converged, retired
                     FROM metric_records WHERE concept_id = ?1
                     ORDER BY revision ASC",
                )
                .map_err(storage_err("Failed to prepare metric history"))?;

            let rows = stmt
                .query_map(rusqlite::params![concept_id.0], row_to_metric)
                .map_err(storage_err("Failed to query metric history"))?;

            let mut history = Vec::new();
            for row in rows {
                history.push(row.map_err(storage_err("Failed to read metric row"))?);
            }
            Ok(history)
        })
    }

    /// Number of stored relevance scores for a domain.
    pub fn score_count(&self, domain: &str) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM relevance_scores WHERE domain = ?1",
                    rusqlite::params![domain],
                    |row| row.get(0),
                )
                .map_err(storage_err("Failed to count scores"))?;
            Ok(count as u64)
        })
    }
}

/// Latest revision row for a concept, tombstone or not.
fn latest_revision(
    conn: &Connection,
    concept_id: ConceptId,
) -> Result<Option<Versioned<Option<MetricRecord>>>> {
    conn.query_row(
        "SELECT concept_id, revision, centrality, depth, authority,
                schema_version, authority_version, centrality_converged, retired
         FROM metric_records WHERE concept_id = ?1
         ORDER BY revision DESC LIMIT 1",
        rusqlite::params![concept_id.0],
        row_to_metric,
    )
    .optional()
    .map_err(storage_err("Failed to load metric"))
}

fn row_to_metric(row: &rusqlite::Row<'_>) -> rusqlite::Result<Versioned<Option<MetricRecord>>> {
    let revision: i64 = row.get(1)?;
    let retired: i64 = row.get(8)?;
    if retired != 0 {
        return Ok(Versioned {
            revision: revision as u64,
            value: None,
        });
    }
    let depth: i64 = row.get(3)?;
    let schema_version: i64 = row.get(5)?;
    let authority_version: i64 = row.get(6)?;
    let converged: i64 = row.get(7)?;
    Ok(Versioned {
        revision: revision as u64,
        value: Some(MetricRecord {
            concept_id: ConceptId(row.get(0)?),
            centrality: row.get(2)?,
            depth: depth as u32,
            authority: row.get(4)?,
            schema_version: schema_version as u32,
            authority_version: authority_version as u32,
            centrality_converged: converged != 0,
        }),
    })
}

#[async_trait]
impl MetricSidecar for SqliteStore {
    async fn upsert_metric(&self, concept_id: ConceptId, record: MetricRecord) -> Result<u64> {
        if concept_id != record.concept_id {
            return Err(ClinrankError::Storage(format!(
                "Record for concept {} written under key {}",
                record.concept_id, concept_id
            )));
        }

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("Failed to begin metric transaction"))?;

            let latest = latest_revision(&tx, concept_id)?;
            if let Some(existing) = &latest {
                if existing.value.as_ref() == Some(&record) {
                    return Ok(existing.revision);
                }
            }
            let revision = latest.map(|v| v.revision + 1).unwrap_or(1);

            tx.execute(
                "INSERT INTO metric_records
                    (concept_id, revision, centrality, depth, authority,
                     schema_version, authority_version, centrality_converged)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    concept_id.0,
                    revision as i64,
                    record.centrality,
                    record.depth as i64,
                    record.authority,
                    record.schema_version as i64,
                    record.authority_version as i64,
                    record.centrality_converged as i32,
                ],
            )
            .map_err(storage_err("Failed to insert metric"))?;

            tx.commit()
                .map_err(storage_err("Failed to commit metric"))?;
            Ok(revision)
        })
    }

    async fn get_metric(&self, concept_id: ConceptId) -> Result<Option<Versioned<MetricRecord>>> {
        let latest = self.db.with_conn(|conn| latest_revision(conn, concept_id))?;
        Ok(latest.and_then(|v| {
            v.value.map(|value| Versioned {
                revision: v.revision,
                value,
            })
        }))
    }

    async fn retire_metric(&self, concept_id: ConceptId) -> Result<Option<u64>> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("Failed to begin retire transaction"))?;

            let revision = match latest_revision(&tx, concept_id)? {
                Some(latest) if latest.value.is_some() => latest.revision + 1,
                _ => return Ok(None),
            };
            tx.execute(
                "INSERT INTO metric_records
                    (concept_id, revision, centrality, depth, authority,
                     schema_version, authority_version, centrality_converged, retired)
                 VALUES (?1, ?2, 0.0, 0, 0.0, 0, 0, 0, 1)",
                rusqlite::params![concept_id.0, revision as i64],
            )
            .map_err(storage_err("Failed to insert tombstone"))?;

            tx.commit()
                .map_err(storage_err("Failed to commit tombstone"))?;
            Ok(Some(revision))
        })
    }
}

#[async_trait]
impl RelevanceStore for SqliteStore {
    async fn upsert_score(
        &self,
        concept_id: ConceptId,
        domain: &str,
        score: RelevanceScore,
    ) -> Result<bool> {
        if concept_id != score.concept_id || domain != score.domain {
            return Err(ClinrankError::Storage(format!(
                "Score for ({}, '{}') written under ({}, '{}')",
                score.concept_id, score.domain, concept_id, domain
            )));
        }
        let payload = serde_json::to_string(&score)?;

        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "INSERT INTO relevance_scores (concept_id, domain, score, version, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (concept_id, domain) DO UPDATE SET
                        score = excluded.score,
                        version = excluded.version,
                        payload = excluded.payload,
                        updated_at = strftime('%s', 'now')
                     WHERE relevance_scores.version < excluded.version",
                    rusqlite::params![
                        concept_id.0,
                        domain,
                        score.score,
                        score.version as i64,
                        payload,
                    ],
                )
                .map_err(storage_err("Failed to upsert score"))?;
            Ok(changed > 0)
        })
    }

    async fn get_score(
        &self,
        concept_id: ConceptId,
        domain: &str,
    ) -> Result<Option<Arc<RelevanceScore>>> {
        let payload: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT payload FROM relevance_scores WHERE concept_id = ?1 AND domain = ?2",
                rusqlite::params![concept_id.0, domain],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err("Failed to load score"))
        })?;

        match payload {
            Some(json) => Ok(Some(Arc::new(serde_json::from_str(&json)?))),
            None => Ok(None),
        }
    }
}
