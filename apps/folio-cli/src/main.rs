//! Folio command-line tool
//!
//! Offline access to the viewer engine for inspecting transcription data:
//!
//! - `index`: normalize a page and list indexed boxes and rejected lines
//! - `pick`: hit-test a point on a page
//! - `rank`: rank suggestions per line
//! - `leaderboard`: rank suggestion authors by upvotes received
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use folio_core::geometry::RejectedLine;
use folio_core::store::MemoryDocumentStore;
use folio_core::suggestions::{apply_vote_totals, rank_by_line, LeaderboardRow, RankedLine};
use folio_core::{
    leaderboard, Document, NormalizedBox, PageKey, SortMode, Suggestion, ViewerConfig,
    ViewerSession, Vote, VoteBook,
};

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version, about = "Scan/transcript hit-testing and suggestion ranking")]
struct Cli {
    /// Viewer configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize the line boxes of a page
    Index {
        /// Document JSON file
        document: PathBuf,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Find the line under a point given in page-relative coordinates
    Pick {
        /// Document JSON file
        document: PathBuf,

        /// Horizontal position, 0 = left edge, 1 = right edge
        u: f64,

        /// Vertical position, 0 = top edge, 1 = bottom edge
        v: f64,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Rank suggestions per line
    Rank {
        /// Suggestions JSON file (array)
        suggestions: PathBuf,

        /// Votes JSON file (array); replaces embedded vote counts
        #[arg(long)]
        votes: Option<PathBuf>,

        /// Only rank suggestions for this page key
        #[arg(long)]
        page_key: Option<String>,

        /// Sort mode (default from config)
        #[arg(short, long, value_enum)]
        sort: Option<SortArg>,

        /// List every suggestion instead of the per-line cap
        #[arg(short, long)]
        all: bool,
    },

    /// Rank suggestion authors by upvotes received
    Leaderboard {
        /// Suggestions JSON file (array)
        suggestions: PathBuf,

        /// Votes JSON file (array)
        votes: PathBuf,

        /// Profiles JSON file (object of user id to username)
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Number of rows (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct PageArgs {
    /// Page number (default: first numbered page)
    #[arg(short, long, conflicts_with = "key")]
    page: Option<u32>,

    /// Page key, for pages without a number
    #[arg(short, long)]
    key: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum SortArg {
    Top,
    Newest,
}

impl From<SortArg> for SortMode {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Top => SortMode::Top,
            SortArg::Newest => SortMode::Newest,
        }
    }
}

#[derive(Serialize)]
struct IndexReport {
    page_key: PageKey,
    boxes: Vec<NormalizedBox>,
    rejected: Vec<RejectedLine>,
}

#[derive(Serialize)]
struct PickReport {
    page_key: PageKey,
    u: f64,
    v: f64,
    hit: Option<NormalizedBox>,
    transcription: Option<String>,
}

#[derive(Serialize)]
struct RankReport {
    #[serde(flatten)]
    line: RankedLine,
    hidden: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the JSON output
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => ViewerConfig::from_file(path)?,
        None => ViewerConfig::default(),
    };
    debug!(?config, "Loaded configuration");

    match cli.command {
        Commands::Index { document, page } => {
            let session = open_page(config, &document, &page).await?;
            print_json(&index_report(&session)?)
        }
        Commands::Pick {
            document,
            u,
            v,
            page,
        } => {
            let session = open_page(config, &document, &page).await?;
            print_json(&pick_report(&session, u, v)?)
        }
        Commands::Rank {
            suggestions,
            votes,
            page_key,
            sort,
            all,
        } => {
            let mut suggestions: Vec<Suggestion> = read_json(&suggestions)?;
            if let Some(votes) = votes {
                let book: VoteBook = read_json::<Vec<Vote>>(&votes)?.into_iter().collect();
                apply_vote_totals(&mut suggestions, &book);
            }
            if let Some(key) = page_key {
                suggestions.retain(|s| s.page_key.as_str() == key);
            }
            let mode = sort.map(SortMode::from).unwrap_or(config.suggestions.default_sort);
            let cap = if all {
                usize::MAX
            } else {
                config.suggestions.visible_per_line
            };
            print_json(&rank_report(&suggestions, mode, cap))
        }
        Commands::Leaderboard {
            suggestions,
            votes,
            profiles,
            limit,
        } => {
            let suggestions: Vec<Suggestion> = read_json(&suggestions)?;
            let votes: VoteBook = read_json::<Vec<Vote>>(&votes)?.into_iter().collect();
            let profiles: HashMap<String, String> = match profiles {
                Some(path) => read_json(&path)?,
                None => HashMap::new(),
            };
            print_json(&leaderboard_rows(
                &config,
                &suggestions,
                &votes,
                &profiles,
                limit,
            ))
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load a document through the in-memory store and select the requested page.
async fn open_page(config: ViewerConfig, path: &Path, page: &PageArgs) -> Result<ViewerSession> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document = Document::from_json(&content)
        .with_context(|| format!("Failed to parse document {}", path.display()))?;

    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut store = MemoryDocumentStore::new();
    store.insert(&id, document);

    let mut session = ViewerSession::new(config);
    session.load_document(&store, &id).await?;
    select(&mut session, page)?;
    Ok(session)
}

fn select(session: &mut ViewerSession, page: &PageArgs) -> Result<()> {
    match (&page.key, page.page) {
        (Some(key), _) => {
            session.select_page_key(&PageKey::new(key.as_str()))?;
        }
        (None, Some(ordinal)) => {
            session.select_page(ordinal)?;
        }
        (None, None) => {}
    }
    if let Some(key) = session.page_key() {
        info!(page = %key, "Using page");
    }
    Ok(())
}

fn current_key(session: &ViewerSession) -> Result<PageKey> {
    session
        .page_key()
        .cloned()
        .context("Document has no pages")
}

fn index_report(session: &ViewerSession) -> Result<IndexReport> {
    Ok(IndexReport {
        page_key: current_key(session)?,
        boxes: session.index().boxes().to_vec(),
        rejected: session.rejected().to_vec(),
    })
}

fn pick_report(session: &ViewerSession, u: f64, v: f64) -> Result<PickReport> {
    let hit = session.index().pick_box(u, v).cloned();
    let transcription = hit.as_ref().and_then(|b| {
        session
            .page()
            .and_then(|p| p.line(&b.uid))
            .map(|line| line.transcription.clone())
    });
    Ok(PickReport {
        page_key: current_key(session)?,
        u,
        v,
        hit,
        transcription,
    })
}

fn rank_report(suggestions: &[Suggestion], mode: SortMode, cap: usize) -> Vec<RankReport> {
    rank_by_line(suggestions, mode)
        .into_values()
        .map(|mut line| {
            let hidden = line.hidden_count(cap);
            line.entries.truncate(cap);
            RankReport { line, hidden }
        })
        .collect()
}

fn leaderboard_rows(
    config: &ViewerConfig,
    suggestions: &[Suggestion],
    votes: &VoteBook,
    profiles: &HashMap<String, String>,
    limit: Option<usize>,
) -> Vec<LeaderboardRow> {
    let mut options = config.suggestions.leaderboard_options();
    if let Some(limit) = limit {
        options.limit = limit;
    }
    leaderboard(suggestions, votes, profiles, options)
}
