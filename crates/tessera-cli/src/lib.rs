use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tessera_context::{ContextConfig, ContextError, ContextStore, WorkingContext};
use tessera_core::{CharRatioEstimator, ContextEntry, EntryType, TokenEstimator};
use tessera_task::{BatchError, TaskBatcher, TaskSpec};
use thiserror::Error;
use tracing::debug;

pub fn crate_name() -> &'static str {
    "tessera-cli"
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tessera",
    version,
    about = "Inspect and plan over a manifest of context entries and tasks",
    long_about = "Loads a JSON manifest of context entries and tasks into a fresh store, then prints the working view, ranked search results, a batch plan or TTL turn statistics"
)]
pub struct Cli {
    #[arg(
        long,
        short,
        global = true,
        env = "TESSERA_MANIFEST",
        default_value = "tessera.json",
        help = "Path to the JSON manifest"
    )]
    pub manifest: PathBuf,
    #[arg(
        long,
        global = true,
        help = "Maximum entries per implementation context and per batch [default: TESSERA_MAX_ENTRIES or 200]"
    )]
    pub max_entries: Option<usize>,
    #[arg(
        long,
        global = true,
        help = "Dimension of the hashing embedder [default: TESSERA_EMBEDDING_DIM or 1024]"
    )]
    pub embedding_dim: Option<usize>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Print the summary-only working view")]
    View,
    #[command(about = "Rank entry summaries against a query")]
    Search {
        #[arg(help = "Search query")]
        query: String,
        #[arg(long, help = "Maximum number of results [default: TESSERA_SEARCH_LIMIT or 10]")]
        limit: Option<usize>,
        #[arg(long, help = "Minimum similarity score (0.0-1.0) [default: TESSERA_MIN_SCORE or 0.0]")]
        min_score: Option<f32>,
    },
    #[command(about = "Group the manifest tasks into batches")]
    Plan {
        #[arg(long, help = "Keep manifest order instead of sorting by priority")]
        no_priority: bool,
    },
    #[command(about = "Run TTL turns and report what expired")]
    Turns {
        #[arg(default_value_t = 1, help = "Number of turns to run")]
        count: usize,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// One entry as written in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default)]
    pub source: String,
    pub summary: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub ttl: Option<i64>,
}

impl ManifestEntry {
    fn into_entry(self) -> ContextEntry {
        let source = if self.source.is_empty() { "manifest".to_string() } else { self.source };
        let mut entry = ContextEntry::new(self.id, self.entry_type, source, self.summary);
        if let Some(content) = self.content {
            entry = entry.with_content(content);
        }
        if let Some(ttl) = self.ttl {
            entry = entry.with_ttl(ttl);
        }
        entry
    }
}

/// Entries and tasks to load into a fresh store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let json = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Store holding every entry plus one TASK entry per task
    pub fn into_store(self, config: &ContextConfig) -> Result<(ContextStore, Vec<TaskSpec>), CliError> {
        let store = ContextStore::from_config(config);
        for entry in self.entries {
            store.add(entry.into_entry())?;
        }
        for task in &self.tasks {
            store.add(task.to_entry())?;
        }
        debug!(entries = store.len(), tasks = self.tasks.len(), "Loaded manifest");
        Ok((store, self.tasks))
    }
}

impl Cli {
    /// `TESSERA_*` environment settings with the command line flags on top
    pub fn config(&self) -> Result<ContextConfig, CliError> {
        self.config_over(ContextConfig::from_env()?)
    }

    /// Apply the flags that were given to `base`
    pub fn config_over(&self, base: ContextConfig) -> Result<ContextConfig, CliError> {
        let mut config = base;
        if let Some(max_entries) = self.max_entries {
            config = config.with_max_entries(max_entries);
        }
        if let Some(dimension) = self.embedding_dim {
            config = config.with_embedding_dimension(dimension);
        }
        if let Commands::Search { limit, min_score, .. } = &self.command {
            if let Some(limit) = limit {
                config = config.with_search_limit(*limit);
            }
            if let Some(min_score) = min_score {
                config = config.with_min_score(*min_score);
            }
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn run(cli: Cli) -> Result<String, CliError> {
    let manifest = Manifest::load(&cli.manifest)?;
    run_with(&cli, manifest)
}

/// Execute `cli` against an already loaded manifest
pub fn run_with(cli: &Cli, manifest: Manifest) -> Result<String, CliError> {
    run_with_config(cli, manifest, cli.config()?)
}

/// Execute `cli` against a manifest with an already resolved config
pub fn run_with_config(cli: &Cli, manifest: Manifest, config: ContextConfig) -> Result<String, CliError> {
    let (store, tasks) = manifest.into_store(&config)?;

    match &cli.command {
        Commands::View => Ok(render_view(&store, &config)),
        Commands::Search { query, .. } => {
            let hits = WorkingContext::from_config(&store, &config).search(query)?;
            if hits.is_empty() {
                return Ok(format!("no entries match {query:?}"));
            }
            let mut out = String::new();
            for hit in hits {
                let _ = writeln!(out, "{:.3}\t{}\t{}", hit.score, hit.entry.id, hit.entry.summary);
            }
            Ok(out.trim_end().to_string())
        }
        Commands::Plan { no_priority } => {
            let batches = TaskBatcher::from_config(&config).create_batches(tasks, !no_priority)?;
            if batches.is_empty() {
                return Ok("no tasks to plan".to_string());
            }
            let mut out = String::new();
            for batch in &batches {
                let entries: Vec<&str> = batch.entry_ids.iter().map(String::as_str).collect();
                let _ = writeln!(
                    out,
                    "batch {}: {} tasks, {} entries",
                    batch.index,
                    batch.tasks.len(),
                    batch.entry_count()
                );
                let _ = writeln!(out, "  tasks: {}", batch.task_ids().join(", "));
                let _ = writeln!(out, "  entries: {}", entries.join(", "));
            }
            Ok(out.trim_end().to_string())
        }
        Commands::Turns { count } => {
            let mut out = String::new();
            for turn in 1..=*count {
                let stats = store.process_turn();
                let _ = writeln!(
                    out,
                    "turn {turn}: decremented {}, removed {}, deferred {}",
                    stats.decremented, stats.removed, stats.deferred
                );
            }
            let _ = write!(out, "{} entries remain", store.len());
            Ok(out)
        }
    }
}

fn render_view(store: &ContextStore, config: &ContextConfig) -> String {
    let view = WorkingContext::from_config(store, config).build();
    let estimator = CharRatioEstimator::default();
    let mut out = format!(
        "{} entries, ~{} summary tokens",
        view.total_count, view.summary_tokens
    );
    for entry in &view.entries {
        let marker = if entry.compressed { " (compressed)" } else { "" };
        let _ = write!(
            out,
            "\n{}\t{}\t{}\t{}{marker}",
            entry.id,
            entry.entry_type,
            estimator.estimate(&entry.summary),
            entry.summary
        );
    }
    out
}
