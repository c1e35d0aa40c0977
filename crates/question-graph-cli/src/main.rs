//! CLI for the question similarity graph.
//!
//! Subcommands:
//!  - `graph`     : build the summary/category/question graph for one or more users.
//!  - `clusters`  : print the near-duplicate question groups of a user.
//!  - `normalize` : print the questions extracted from a user's history.
//!
//! Input is a JSON store snapshot (`{"summaries": [...], "history": [...]}`).
//! Logs go to stderr (`RUST_LOG` controls the level); results go to stdout or
//! to `--out`.
//!
//! Usage examples:
//!  cargo run -p question-graph -- graph --store store.json --user 7 --json
//!  cargo run -p question-graph -- clusters --store store.json --user 7 --threshold 0.9

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use question_graph::utils::logging;
use question_graph::{
    embed, ClusterReport, Embedder, GraphBuilder, GraphConfig, HashEmbedder, JsonStore,
    SimilarityGraph,
};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "question-graph",
    about = "Question similarity graphs over document Q&A history",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the similarity graph for one or more users.
    Graph(GraphArgs),

    /// Show which questions were merged into groups.
    Clusters(ClustersArgs),

    /// Show the questions extracted per summary, before embedding.
    Normalize(NormalizeArgs),
}

/// Which embedding model to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// MiniLM sentence embeddings (downloads model assets on first use).
    #[default]
    Minilm,
    /// Deterministic hash vectors; offline, only identical texts merge.
    Hash,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
struct StoreArgs {
    /// Path to the JSON store snapshot.
    #[arg(short, long, value_name = "PATH")]
    store: PathBuf,

    /// Optional JSON config file; flags override its values.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of a text summary.
    #[arg(long)]
    json: bool,
}

/// Options for commands that embed questions.
#[derive(Args, Debug)]
struct EmbedArgs {
    /// Cosine similarity threshold for merging (inclusive).
    #[arg(long)]
    threshold: Option<f32>,

    #[arg(long, value_enum, default_value_t = EmbedderKind::Minilm)]
    embedder: EmbedderKind,

    /// Number of embedding workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Cache size per embedding worker.
    #[arg(long)]
    cache_size: Option<usize>,
}

#[derive(Args, Debug)]
struct GraphArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    embed: EmbedArgs,

    /// User to build for. Repeatable.
    #[arg(short, long = "user", value_name = "ID")]
    users: Vec<i64>,

    /// Build for every user present in the store.
    #[arg(long, conflicts_with = "users")]
    all_users: bool,

    /// Write the JSON result to this file instead of stdout.
    #[arg(long, short = 'o', value_name = "PATH")]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ClustersArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    embed: EmbedArgs,

    #[arg(short, long, value_name = "ID")]
    user: i64,

    /// Also list singleton questions.
    #[arg(long)]
    all: bool,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(short, long, value_name = "ID")]
    user: i64,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Graph(args) => run_graph(args),
        Commands::Clusters(args) => run_clusters(args),
        Commands::Normalize(args) => run_normalize(args),
    };

    // Stop embedding workers even when the command failed.
    if let Err(err) = embed::shutdown() {
        warn!(error = %err, "embedding pool shutdown failed");
    }
    outcome
}

fn load_config(store: &StoreArgs, embed: Option<&EmbedArgs>) -> Result<GraphConfig> {
    let mut cfg = match &store.config {
        Some(path) => GraphConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GraphConfig::default(),
    };
    if let Some(e) = embed {
        if let Some(t) = e.threshold {
            cfg = cfg.with_threshold(t);
        }
        if let Some(w) = e.workers {
            cfg.embed_workers = w;
        }
        if let Some(c) = e.cache_size {
            cfg.embed_cache_size = c;
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn open_store(path: &Path) -> Result<Arc<JsonStore>> {
    let start = Instant::now();
    let store = JsonStore::open(path)
        .with_context(|| format!("failed to open store {}", path.display()))?;
    info!(path = %path.display(), elapsed = ?start.elapsed(), "store loaded");
    Ok(Arc::new(store))
}

fn make_embedder(kind: EmbedderKind, cfg: &GraphConfig) -> Result<Arc<dyn Embedder>> {
    let model: Arc<dyn Embedder> = match kind {
        EmbedderKind::Minilm => embed::default_embedder(cfg.embed_workers, cfg.embed_cache_size)
            .context("failed to initialize embedding model")?,
        EmbedderKind::Hash => Arc::new(HashEmbedder::default()),
    };
    info!(model = model.model_name(), dim = model.dimension(), "embedder ready");
    Ok(model)
}

fn builder(store: &StoreArgs, embed: &EmbedArgs) -> Result<(GraphBuilder, Arc<JsonStore>)> {
    let cfg = load_config(store, Some(embed))?;
    let json_store = open_store(&store.store)?;
    let model = make_embedder(embed.embedder, &cfg)?;
    let builder = GraphBuilder::new(json_store.clone(), model, cfg)?;
    Ok((builder, json_store))
}

fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            println!("Saved graph to {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

#[derive(Serialize)]
struct UserGraph {
    user_id: i64,
    #[serde(flatten)]
    graph: SimilarityGraph,
}

fn run_graph(args: GraphArgs) -> Result<()> {
    let (builder, json_store) = builder(&args.store, &args.embed)?;

    let users = if args.all_users {
        json_store.snapshot().user_ids()
    } else {
        args.users.clone()
    };
    if users.is_empty() {
        bail!("no users to build: pass --user <ID> or --all-users");
    }

    let start = Instant::now();
    let graphs: Vec<UserGraph> = users
        .par_iter()
        .map(|&user_id| {
            builder
                .build(user_id)
                .map(|graph| UserGraph { user_id, graph })
                .with_context(|| format!("graph build failed for user {user_id}"))
        })
        .collect::<Result<Vec<_>>>()?;
    info!(users = graphs.len(), elapsed = ?start.elapsed(), "all graphs built");

    if args.store.json || args.out.is_some() {
        // A single user keeps the plain graph shape.
        if let [only] = graphs.as_slice() {
            return write_json(&only.graph, args.out.as_deref());
        }
        return write_json(&graphs, args.out.as_deref());
    }

    for g in &graphs {
        let s = &g.graph.stats;
        println!(
            "user {}: {} summaries, {} categories, {} questions ({} merged into {} groups), {} edges",
            g.user_id, s.summaries, s.categories, s.questions, s.merged_questions, s.groups, s.edges
        );
    }
    Ok(())
}

fn run_clusters(args: ClustersArgs) -> Result<()> {
    let (builder, _) = builder(&args.store, &args.embed)?;
    let report = builder.clusters(args.user)?;

    if args.store.json {
        println!("{}", serde_json::to_string_pretty(&cluster_view(&report, args.all))?);
        return Ok(());
    }

    println!(
        "{} questions, {} groups (threshold {:.2}); cache: {} reused, {} regenerated, {} rejected",
        report.questions.len(),
        report.groups.len(),
        builder.config().similarity_threshold,
        report.resolve.reused,
        report.resolve.regenerated,
        report.resolve.rejected
    );
    for group in report.groups.iter().filter(|g| args.all || !g.is_singleton()) {
        let rep = &report.questions[group.representative()];
        println!("\n[{}] {} ({} similar)", rep.id, rep.question, group.len());
        for (&i, sim) in group.members.iter().zip(&group.similarities).skip(1) {
            let q = &report.questions[i];
            match sim {
                Some(s) => println!("  {:.3}  {} (summary {})", s, q.question, q.summary_id),
                None => println!("    -    {} (summary {})", q.question, q.summary_id),
            }
        }
    }
    for skipped in &report.skipped {
        warn!(record = skipped.record_id, reason = %skipped.reason, "record skipped");
    }
    Ok(())
}

fn cluster_view(report: &ClusterReport, include_singletons: bool) -> serde_json::Value {
    let groups: Vec<serde_json::Value> = report
        .groups
        .iter()
        .filter(|g| include_singletons || !g.is_singleton())
        .map(|g| {
            let members: Vec<serde_json::Value> = g
                .members
                .iter()
                .zip(&g.similarities)
                .map(|(&i, sim)| {
                    let q = &report.questions[i];
                    json!({
                        "id": q.id,
                        "question": q.question,
                        "summary_id": q.summary_id,
                        "category": q.category,
                        "similarity": sim,
                    })
                })
                .collect();
            json!({
                "representative": report.questions[g.representative()].id,
                "members": members,
            })
        })
        .collect();
    json!({
        "questions": report.questions.len(),
        "groups": groups,
        "resolve": report.resolve,
        "skipped": report.skipped,
    })
}

fn run_normalize(args: NormalizeArgs) -> Result<()> {
    let cfg = load_config(&args.store, None)?;
    let json_store = open_store(&args.store.store)?;
    // Normalizing never embeds; the hash model only satisfies the builder.
    let builder = GraphBuilder::new(json_store, Arc::new(HashEmbedder::default()), cfg)?;
    let (summaries, report) = builder.normalize(args.user)?;

    if args.store.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (summary, entry) in summaries.iter().zip(&report.per_summary) {
        println!("{} [{}]", summary.label(), summary.id);
        for q in &entry.questions {
            let answer = if q.answer.is_empty() { "(unanswered)" } else { q.answer.as_str() };
            println!("  - [{}] {} -> {}", q.category, q.question, answer);
        }
    }
    if !report.skipped.is_empty() {
        println!("\n{} record(s) skipped:", report.skipped.len());
        for s in &report.skipped {
            println!("  history {}: {}", s.record_id, s.reason);
        }
    }
    Ok(())
}
