//! CLI argument definitions for the clinrank binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clinrank: relevance scoring and hybrid search over a clinical vocabulary graph.
#[derive(Parser, Debug)]
#[command(name = "clinrank", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Graph snapshot (JSON) to load concepts, edges, and embeddings from.
    #[arg(short = 's', long = "snapshot", global = true)]
    pub snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute graph metrics and persist them to the sidecar.
    Metrics,
    /// Refresh relevance scores for every concept against one domain.
    Score {
        #[arg(long)]
        domain: String,
    },
    /// Top concepts for a domain, best first.
    Search {
        #[arg(long)]
        domain: String,
        /// Maximum number of results; defaults to `search.default_limit`.
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long = "min-score", default_value_t = 0.0)]
        min_score: f64,
        /// Candidate pool multiplier over the limit.
        #[arg(long)]
        oversample: Option<usize>,
    },
    /// Concepts whose embeddings are closest to a given concept's.
    Similar {
        #[arg(long)]
        concept: i64,
        /// Maximum number of results; defaults to `search.default_limit`.
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum cosine similarity, in [-1, 1].
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        threshold: f64,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CLINRANK_CONFIG env var > ~/.clinrank/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CLINRANK_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the snapshot path.
    ///
    /// Priority: --snapshot flag > CLINRANK_SNAPSHOT env var > `<data_dir>/snapshot.json`.
    pub fn resolve_snapshot_path(&self, data_dir: &str) -> PathBuf {
        if let Some(ref p) = self.snapshot {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CLINRANK_SNAPSHOT") {
            return PathBuf::from(p);
        }
        expand_home(data_dir).join("snapshot.json")
    }

    /// Resolve the log filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        config_level.to_string()
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        return home_dir().join(rest);
    }
    PathBuf::from(path)
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

fn default_config_path() -> PathBuf {
    home_dir().join(".clinrank").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = CliArgs::parse_from([
            "clinrank",
            "--snapshot",
            "graph.json",
            "search",
            "--domain",
            "Condition",
            "--limit",
            "10",
            "--min-score",
            "0.5",
        ]);
        assert_eq!(args.snapshot, Some(PathBuf::from("graph.json")));
        match args.command {
            Command::Search {
                domain,
                limit,
                min_score,
                oversample,
            } => {
                assert_eq!(domain, "Condition");
                assert_eq!(limit, Some(10));
                assert_eq!(min_score, 0.5);
                assert!(oversample.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_similar() {
        let args = CliArgs::parse_from([
            "clinrank",
            "similar",
            "--concept",
            "201826",
            "--threshold",
            "-0.25",
        ]);
        match args.command {
            Command::Similar {
                concept,
                limit,
                threshold,
            } => {
                assert_eq!(concept, 201826);
                assert!(limit.is_none());
                assert_eq!(threshold, -0.25);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["clinrank", "metrics", "--config", "custom.toml"]);
        assert!(matches!(args.command, Command::Metrics));
        assert_eq!(args.resolve_config_path(), PathBuf::from("custom.toml"));
    }

    #[test]
    fn test_log_flag_wins() {
        let args = CliArgs::parse_from(["clinrank", "--log-level", "debug", "metrics"]);
        assert_eq!(args.resolve_log_filter("warn"), "debug");
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/var/lib/clinrank"), PathBuf::from("/var/lib/clinrank"));
        assert!(expand_home("~/data").ends_with("data"));
    }
}
