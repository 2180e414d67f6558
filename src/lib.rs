pub mod cancel;
pub mod config;
pub mod connectors;
pub mod error;
pub mod indexer;
pub mod model;
pub mod search;
pub mod storage;

use anyhow::{Context, Result, bail};
use cancel::CancelToken;
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use config::StoreConfig;
use connectors::tsv::TsvRecordDecoder;
use model::types::{Dataset, Generation, IngestMode, Language, StoredRecord};
use search::query::{QueryService, SearchHit};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::CatalogStore;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "catsearch",
    version,
    about = "Generation-tracked ingest and ranked title search over catalog dumps"
)]
pub struct Cli {
    /// Path to the SQLite database (defaults to platform data dir)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a tab-separated title dump as a new generation
    Ingest {
        #[arg(long)]
        dataset: Dataset,

        /// `replace` drops every existing row first; `append` keeps them until swept
        #[arg(long, default_value = "replace")]
        mode: IngestMode,

        file: PathBuf,
    },
    /// Ranked title search over the live generation
    Search {
        #[arg(long)]
        dataset: Dataset,

        /// Search one language index; omit to cascade ja, en, x-jat
        #[arg(long)]
        language: Option<Language>,

        /// Maximum hits (defaults to `default_limit` from config)
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,

        query: String,
    },
    /// Look up stored rows by id or natural key
    Get {
        #[arg(long)]
        dataset: Dataset,

        #[arg(long, conflicts_with = "key", required_unless_present = "key")]
        id: Option<i64>,

        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// List generations of a dataset, oldest first
    Generations {
        #[arg(long)]
        dataset: Dataset,

        #[arg(long)]
        json: bool,
    },
    /// Reclaim rows of generations dead for longer than the retention window
    Sweep {
        #[arg(long)]
        retention_secs: Option<u64>,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "catsearch", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let man = clap_mangen::Man::new(Cli::command());
            man.render(&mut std::io::stdout())?;
            Ok(())
        }
        command => {
            let mut config = StoreConfig::load(cli.config.as_deref())?;
            if let Some(db) = cli.db {
                config.db_path = db;
            }

            let cancel = CancelToken::new();
            let watcher = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received, cancelling");
                        cancel.cancel();
                    }
                }
            });

            let result =
                tokio::task::spawn_blocking(move || execute(command, &config, &cancel)).await?;
            watcher.abort();
            result
        }
    }
}

fn execute(command: Commands, config: &StoreConfig, cancel: &CancelToken) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match command {
        Commands::Ingest {
            dataset,
            mode,
            file,
        } => {
            let reader = File::open(&file)
                .with_context(|| format!("opening record file {}", file.display()))?;
            let mut source = TsvRecordDecoder::new(BufReader::new(reader));
            let mut store = CatalogStore::open(&config.db_path)?;
            let outcome = indexer::ingest(&mut store, dataset, mode, &mut source, cancel)
                .with_context(|| format!("ingesting {}", file.display()))?;
            serde_json::to_writer_pretty(&mut out, &outcome)?;
            writeln!(out)?;
        }
        Commands::Search {
            dataset,
            language,
            limit,
            json,
            query,
        } => {
            let store = open_for_read(&config.db_path)?;
            let service = QueryService::new(&store);
            let limit = limit.unwrap_or(config.default_limit);
            let hits = match language {
                Some(language) => service.search(dataset, language, &query, limit)?,
                None => service.cascading_search(dataset, &query, limit)?.hits,
            };
            if json {
                serde_json::to_writer_pretty(&mut out, &hits)?;
                writeln!(out)?;
            } else {
                print_hits(&mut out, &hits)?;
            }
        }
        Commands::Get {
            dataset,
            id,
            key,
            json,
        } => {
            let store = open_for_read(&config.db_path)?;
            let lookup = match (id, key) {
                (Some(id), _) => store.get_by_id(dataset, id).map(|record| vec![record]),
                (None, Some(key)) => store.get_by_natural_key(dataset, &key),
                (None, None) => bail!("either --id or --key is required"),
            };
            let records = match lookup {
                Ok(records) => records,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            if json {
                serde_json::to_writer_pretty(&mut out, &records)?;
                writeln!(out)?;
            } else {
                print_records(&mut out, &records)?;
            }
        }
        Commands::Generations { dataset, json } => {
            let store = open_for_read(&config.db_path)?;
            let generations = store.list_generations(dataset)?;
            if json {
                serde_json::to_writer_pretty(&mut out, &generations)?;
                writeln!(out)?;
            } else {
                print_generations(&mut out, &generations)?;
            }
        }
        Commands::Sweep { retention_secs } => {
            let retention = retention_secs.map_or_else(|| config.retention(), Duration::from_secs);
            let mut store = CatalogStore::open(&config.db_path)?;
            let report = store.sweep_expired(retention, cancel)?;
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
        other @ (Commands::Completions { .. } | Commands::Man) => {
            bail!("{other:?} does not use the catalog store")
        }
    }
    Ok(())
}

fn open_for_read(path: &Path) -> Result<CatalogStore> {
    if !path.exists() {
        bail!(
            "no catalog database at {} (run `catsearch ingest` first)",
            path.display()
        );
    }
    Ok(CatalogStore::open_readonly(path)?)
}

fn print_hits(out: &mut impl Write, hits: &[SearchHit]) -> Result<()> {
    if hits.is_empty() {
        writeln!(out, "{}", "no matches".dimmed())?;
        return Ok(());
    }
    for hit in hits {
        writeln!(
            out,
            "{:>8.4}  {:<5}  {:>6}  {}  {}",
            hit.score,
            hit.language.tag().cyan(),
            hit.record.id,
            hit.record.record.natural_key.bold(),
            hit.record.record.title
        )?;
    }
    Ok(())
}

fn print_records(out: &mut impl Write, records: &[StoredRecord]) -> Result<()> {
    if records.is_empty() {
        writeln!(out, "{}", "no matches".dimmed())?;
        return Ok(());
    }
    for stored in records {
        let rec = &stored.record;
        writeln!(
            out,
            "{}  {}  [{} {}{}]  {}",
            stored.id,
            rec.natural_key.bold(),
            rec.language,
            rec.kind.as_str(),
            if rec.official { ", official" } else { "" },
            rec.title
        )?;
        if !rec.synonyms.is_empty() {
            writeln!(out, "    synonyms: {}", rec.synonyms.join(", "))?;
        }
        if !rec.tags.is_empty() {
            writeln!(out, "    tags: {}", rec.tags.join(", "))?;
        }
        if !rec.relations.is_empty() {
            writeln!(out, "    related: {}", rec.relations.join(", "))?;
        }
        for source in &rec.sources {
            writeln!(out, "    source: {source}")?;
        }
    }
    Ok(())
}

fn print_generations(out: &mut impl Write, generations: &[Generation]) -> Result<()> {
    for generation in generations {
        writeln!(
            out,
            "#{:<5} ids {}..={}  {:<22}  created {}",
            generation.id,
            generation.range.first_id,
            generation.range.last_id,
            format!("{:?}", generation.state()).yellow(),
            format_millis(generation.created_at)
        )?;
    }
    Ok(())
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339())
}
