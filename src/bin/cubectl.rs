//! cubectl - command line access to an olapcube store
//!
//! Usage:
//!   cubectl --config store.json --schema schema.json shards --app shop
//!   cubectl --config store.json ingest --app shop --shard 2024-01 --file batch.json
//!   cubectl --config store.json merge --app shop --shard 2024-01 --timeout 30
//!   cubectl --config store.json --schema schema.json search --app shop --table orders \
//!       --query 'ANY customer(city = Paris)' --order -total --size 20
//!
//! Every command prints pretty JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use olapcube::{
    MemorySchemaProvider, MergeOptions, OlapAggregate, SearchRequest, SegmentBatch, ShardSelector,
    StoreConfig, StoreManager,
};
use olapcube::resource::ResourceManager;

#[derive(Parser)]
#[command(name = "cubectl")]
#[command(about = "Shard-partitioned columnar OLAP store", long_about = None)]
struct Cli {
    /// Store config JSON. Defaults apply when omitted.
    #[arg(long, env = "OLAPCUBE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory; overrides the config's data_dir
    #[arg(long, env = "OLAPCUBE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Per-shard fan-out threads; auto-tuned when neither this nor a
    /// config file is given
    #[arg(long)]
    threads: Option<usize>,

    /// Schema JSON: {"applications": [...]}
    #[arg(long, env = "OLAPCUBE_SCHEMA")]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the shards of an application
    Shards {
        #[arg(long)]
        app: String,
    },
    /// List the durable segments of a shard
    Segments {
        #[arg(long)]
        app: String,
        #[arg(long)]
        shard: String,
    },
    /// Merge a shard's segments into a new cube
    Merge {
        #[arg(long)]
        app: String,
        #[arg(long)]
        shard: String,
        /// Grace period in seconds before superseded segments are deleted
        #[arg(long, default_value = "0")]
        timeout: u64,
        /// Rewrite a shard that is already a single cube
        #[arg(long)]
        force: bool,
        /// Retention date (YYYY-MM-DD) recorded on the shard
        #[arg(long)]
        expire_date: Option<NaiveDate>,
    },
    /// Search documents of a table
    Search {
        #[arg(long)]
        app: String,
        #[arg(long)]
        table: String,
        #[arg(long, default_value = "*")]
        query: String,
        /// Fields to return; all stored fields when omitted
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Sort field, `-field` for descending
        #[arg(long)]
        order: Option<String>,
        #[arg(long, default_value = "100")]
        size: usize,
        #[arg(long, default_value = "0")]
        skip: usize,
        /// Page in id order from this id, inclusive
        #[arg(long, conflicts_with_all = ["order", "continue_after"])]
        continue_at: Option<String>,
        /// Page in id order after this id
        #[arg(long, conflicts_with = "order")]
        continue_after: Option<String>,
        #[command(flatten)]
        target: Target,
    },
    /// Grouped aggregation over a table
    Aggregate {
        #[arg(long)]
        app: String,
        #[arg(long)]
        table: String,
        #[arg(long, default_value = "*")]
        query: String,
        /// Grouping fields, local or `link.field`
        #[arg(long, value_delimiter = ',')]
        group_by: Vec<String>,
        /// Metrics such as `count` or `sum(total)`; repeatable
        #[arg(long)]
        metric: Vec<String>,
        /// `link=query` restricting a linked table scan; repeatable
        #[arg(long)]
        x_filter: Vec<String>,
        #[command(flatten)]
        target: Target,
    },
    /// Write a JSON batch file as a new segment
    Ingest {
        #[arg(long)]
        app: String,
        #[arg(long)]
        shard: String,
        #[arg(long)]
        file: PathBuf,
        /// Never replace documents that already exist
        #[arg(long)]
        keep_existing: bool,
    },
}

/// Shard targeting shared by search and aggregate.
#[derive(Args)]
struct Target {
    /// Two comma-separated fields for `_pair.first` / `_pair.second`
    #[arg(long)]
    pair: Option<String>,
    /// Comma-separated shard list
    #[arg(long)]
    shards: Option<String>,
    /// Inclusive range `start,end`
    #[arg(long)]
    shards_range: Option<String>,
    /// Comma-separated x-shard list; defaults to the searched shards
    #[arg(long)]
    x_shards: Option<String>,
    /// Inclusive x-shard range `start,end`
    #[arg(long)]
    x_shards_range: Option<String>,
}

impl Target {
    fn selectors(&self) -> Result<(Option<ShardSelector>, Option<ShardSelector>)> {
        let shards = ShardSelector::from_params(self.shards.as_deref(), self.shards_range.as_deref())?;
        let x_shards = ShardSelector::from_params(self.x_shards.as_deref(), self.x_shards_range.as_deref())?;
        Ok((shards, x_shards))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::read_from(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => StoreConfig::default().with_search_threads(ResourceManager::auto_tune().search_threads),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(threads) = cli.threads {
        config.search_threads = threads;
    }
    let schema = match &cli.schema {
        Some(path) => MemorySchemaProvider::from_json_file(path)
            .with_context(|| format!("reading schema {}", path.display()))?,
        None => MemorySchemaProvider::new(),
    };
    let manager = StoreManager::open(config, Arc::new(schema))?;

    match cli.command {
        Command::Shards { app } => print(&manager.list_shards(&app)?),
        Command::Segments { app, shard } => print(&manager.list_segments(&app, &shard)?),
        Command::Merge {
            app,
            shard,
            timeout,
            force,
            expire_date,
        } => {
            let options = MergeOptions {
                expire_date,
                timeout,
                force_merge: force,
            };
            print(&manager.merge(&app, &shard, &options)?)
        }
        Command::Search {
            app,
            table,
            query,
            fields,
            order,
            size,
            skip,
            continue_at,
            continue_after,
            target,
        } => {
            let (shards, x_shards) = target.selectors()?;
            let request = SearchRequest {
                query,
                fields,
                order,
                size,
                skip,
                continue_at,
                continue_after,
                pair: target.pair,
                shards,
                x_shards,
            };
            print(&manager.search(&app, &table, &request)?)
        }
        Command::Aggregate {
            app,
            table,
            query,
            group_by,
            metric,
            x_filter,
            target,
        } => {
            let (shards, x_shards) = target.selectors()?;
            let mut request = OlapAggregate::new(&query);
            request.group_by = group_by;
            request.metrics = metric;
            for entry in &x_filter {
                let (link, text) = entry
                    .split_once('=')
                    .with_context(|| format!("x-filter '{}' is not link=query", entry))?;
                request = request.x_filter(link.trim(), text.trim());
            }
            request.pair = target.pair;
            request.shards = shards;
            request.x_shards = x_shards;
            print(&manager.aggregate(&app, &table, &request)?)
        }
        Command::Ingest {
            app,
            shard,
            file,
            keep_existing,
        } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("reading batch {}", file.display()))?;
            let batch: SegmentBatch = serde_json::from_str(&contents)?;
            let segment = manager.add_segment(&app, &shard, &batch, !keep_existing)?;
            info!(app = %app, shard = %shard, segment = %segment, "batch ingested");
            print(&segment)
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
