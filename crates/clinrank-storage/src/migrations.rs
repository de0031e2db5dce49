//! Database schema migrations.
//!
//! Applies the metric sidecar and relevance score tables plus the
//! schema_migrations bookkeeping table. Version 2 adds metric tombstones.

use rusqlite::Connection;
use tracing::info;

use clinrank_core::error::ClinrankError;

/// Ordered schema steps: (version, name, SQL).
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "metric_sidecar", V1_METRIC_SIDECAR),
    (2, "metric_tombstones", V2_METRIC_TOMBSTONES),
];

/// Latest schema version this build knows how to create.
pub const LATEST_VERSION: i64 = 2;

/// Highest applied migration, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, ClinrankError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| ClinrankError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Apply every migration newer than the recorded version.
///
/// A database written by a newer build is refused rather than downgraded.
pub fn run_migrations(conn: &Connection) -> Result<(), ClinrankError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ClinrankError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current = current_version(conn)?;
    if current > LATEST_VERSION {
        return Err(ClinrankError::Storage(format!(
            "Sidecar schema v{} is newer than supported v{}",
            current, LATEST_VERSION
        )));
    }

    for &(version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        conn.execute_batch(sql)
            .and_then(|_| {
                conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![version, name],
                )
            })
            .map_err(|e| ClinrankError::Storage(format!("Migration v{} failed: {}", version, e)))?;
        info!(version, name, "Applied sidecar migration");
    }

    Ok(())
}

/// Version 1: append-only metric history and relevance scores.
const V1_METRIC_SIDECAR: &str = "
        -- Every revision of a concept's metrics; rows are never updated.
        CREATE TABLE IF NOT EXISTS metric_records (
            concept_id           INTEGER NOT NULL,
            revision             INTEGER NOT NULL CHECK (revision >= 1),
            centrality           REAL NOT NULL CHECK (centrality >= 0.0 AND centrality <= 1.0),
            depth                INTEGER NOT NULL CHECK (depth >= 0),
            authority            REAL NOT NULL CHECK (authority >= 0.0 AND authority <= 1.0),
            schema_version       INTEGER NOT NULL,
            authority_version    INTEGER NOT NULL,
            centrality_converged INTEGER NOT NULL DEFAULT 1,
            recorded_at          INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            PRIMARY KEY (concept_id, revision)
        );

        -- One row per (concept, domain); the JSON payload is the whole record.
        CREATE TABLE IF NOT EXISTS relevance_scores (
            concept_id  INTEGER NOT NULL,
            domain      TEXT NOT NULL,
            score       REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
            version     INTEGER NOT NULL,
            payload     TEXT NOT NULL,
            updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            PRIMARY KEY (concept_id, domain)
        );

        CREATE INDEX IF NOT EXISTS idx_relevance_domain_score
            ON relevance_scores (domain, score DESC);
";

/// Version 2: a revision can retire its concept instead of carrying metrics.
const V2_METRIC_TOMBSTONES: &str = "
        ALTER TABLE metric_records ADD COLUMN retired INTEGER NOT NULL DEFAULT 0;
";
