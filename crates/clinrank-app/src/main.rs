//! Clinrank application binary - composition root.
//!
//! 1. Load configuration from TOML and initialize tracing
//! 2. Load the graph snapshot (concepts, edges, embeddings)
//! 3. Open the metric sidecar and relevance store (SQLite or in memory)
//! 4. Run the requested command and print its result as JSON on stdout

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use clinrank_core::config::ClinrankConfig;
use clinrank_core::error::Result;
use clinrank_core::types::ConceptId;
use clinrank_graph::{AuthorityScorer, MetricsEngine, MetricsPipeline, RunSummary};
use clinrank_storage::{
    Database, GraphSnapshot, InMemoryMetricSidecar, InMemoryRelevanceStore, MetricSidecar,
    RelevanceStore, SqliteStore,
};
use clinrank_vector::{
    DomainRegistry, EmbeddingIndex, HybridSearchEngine, MockEmbedding, RelevanceCalculator,
    SearchOptions,
};

use cli::{CliArgs, Command};

/// Everything a command needs, wired from one config and one snapshot.
struct Services {
    snapshot: Arc<GraphSnapshot>,
    pipeline: MetricsPipeline,
    calculator: Arc<RelevanceCalculator>,
    search: HybridSearchEngine,
}

/// Sidecar and relevance store: SQLite when a database path is configured.
fn open_stores(
    config: &ClinrankConfig,
) -> Result<(Arc<dyn MetricSidecar>, Arc<dyn RelevanceStore>)> {
    match config.storage.database_path.as_deref() {
        Some(path) => {
            let path = cli::expand_home(path);
            let timeout = Duration::from_millis(config.storage.io_timeout_ms);
            let store = Arc::new(SqliteStore::new(Arc::new(Database::open(&path, timeout)?)));
            tracing::info!(path = %path.display(), "Using SQLite sidecar");
            let sidecar: Arc<dyn MetricSidecar> = store.clone();
            let relevance: Arc<dyn RelevanceStore> = store;
            Ok((sidecar, relevance))
        }
        None => {
            tracing::info!("Using in-memory sidecar");
            let sidecar: Arc<dyn MetricSidecar> = Arc::new(InMemoryMetricSidecar::new());
            let relevance: Arc<dyn RelevanceStore> = Arc::new(InMemoryRelevanceStore::new());
            Ok((sidecar, relevance))
        }
    }
}

/// Index the snapshot's embeddings, or mock ones when it carries none.
///
/// Snapshot embeddings must come from the configured model and dimension.
fn build_index(config: &ClinrankConfig, snapshot: &GraphSnapshot) -> Result<Arc<EmbeddingIndex>> {
    let search = &config.search;
    let (index, records) = if snapshot.embeddings.is_empty() {
        let mock = MockEmbedding::new(search.embedding_dim);
        tracing::warn!(
            model = MockEmbedding::MODEL,
            dimensions = mock.dimensions(),
            "Snapshot has no embeddings; using mock vectors"
        );
        (
            EmbeddingIndex::with_dimension(search.embedding_dim),
            mock.records_for(&snapshot.concepts),
        )
    } else {
        (
            EmbeddingIndex::for_model(search.embedding_dim, &search.embedding_model),
            snapshot.embeddings.clone(),
        )
    };
    let inserted = index.insert_all(records)?;
    tracing::info!(
        embeddings = inserted,
        dimension = search.embedding_dim,
        model = ?index.model(),
        "Embedding index ready"
    );
    Ok(Arc::new(index))
}

fn build_services(config: &ClinrankConfig, snapshot_path: &Path) -> Result<Services> {
    let snapshot = Arc::new(GraphSnapshot::load(snapshot_path)?);
    let (sidecar, store) = open_stores(config)?;

    let authority = Arc::new(AuthorityScorer::new(config.authority.clone())?);
    let engine = Arc::new(MetricsEngine::new(config.centrality.clone(), authority));
    let pipeline = MetricsPipeline::new(
        snapshot.clone(),
        Arc::clone(&sidecar),
        engine,
        Duration::from_millis(config.storage.io_timeout_ms),
    );

    let index = build_index(config, &snapshot)?;
    let domains = Arc::new(DomainRegistry::new());
    for spec in snapshot.domain_specs() {
        match domains.upsert(&spec.label, &spec.members, &index) {
            Ok(profile) => {
                tracing::debug!(domain = %profile.label, revision = profile.revision, "Domain registered")
            }
            Err(e) => tracing::warn!(domain = %spec.label, error = %e, "Domain skipped"),
        }
    }

    let calculator = Arc::new(RelevanceCalculator::new(
        config.scoring.clone(),
        sidecar,
        index.clone(),
        domains.clone(),
        store,
    ));
    let search = HybridSearchEngine::new(
        config.search.clone(),
        domains,
        index,
        Arc::clone(&calculator),
    );

    Ok(Services {
        snapshot,
        pipeline,
        calculator,
        search,
    })
}

async fn run_metrics(services: &Services) -> Result<RunSummary> {
    let summary = services.pipeline.run().await?;
    if let Some(warning) = summary.convergence.as_warning() {
        tracing::warn!(error = %warning, "Centrality scores are approximate");
    }
    Ok(summary)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: CliArgs, config: ClinrankConfig) -> Result<()> {
    let snapshot_path = args.resolve_snapshot_path(&config.general.data_dir);
    let services = build_services(&config, &snapshot_path)?;

    match args.command {
        Command::Metrics => {
            let summary = run_metrics(&services).await?;
            print_json(&serde_json::to_value(&summary)?)
        }
        Command::Score { domain } => {
            run_metrics(&services).await?;
            let ids: Vec<_> = services.snapshot.concepts.iter().map(|c| c.id).collect();
            let outcome = services.calculator.score_domain(&domain, &ids).await?;
            let failures: Vec<_> = outcome
                .failures
                .iter()
                .map(|(id, e)| json!({ "concept_id": id, "reason": e.to_string() }))
                .collect();
            print_json(&json!({
                "domain": domain,
                "computed": outcome.computed,
                "reused": outcome.reused,
                "failures": failures,
            }))
        }
        Command::Search {
            domain,
            limit,
            min_score,
            oversample,
        } => {
            run_metrics(&services).await?;
            let limit = limit.unwrap_or(config.search.default_limit);
            let options = SearchOptions {
                oversample_factor: oversample,
            };
            let hits = services
                .search
                .search_with_options(&domain, limit, min_score, &options)
                .await?;
            print_json(&serde_json::to_value(&hits)?)
        }
        Command::Similar {
            concept,
            limit,
            threshold,
        } => {
            let limit = limit.unwrap_or(config.search.default_limit);
            let hits = services
                .search
                .similar_concepts(ConceptId(concept), limit, threshold)?;
            print_json(&serde_json::to_value(&hits)?)
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config first: it supplies the default log level.
    let config_file = args.resolve_config_path();
    let config = ClinrankConfig::load_or_default(&config_file);

    // Logs go to stderr; stdout carries only JSON results.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(args.resolve_log_filter(&config.general.log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting clinrank v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    if let Err(e) = run(args, config).await {
        tracing::error!(error = %e, "Command failed");
        return Err(e.into());
    }
    Ok(())
}
