//! Trawl main entry point
//!
//! Command-line front end for the crawler engine: loads options, applies
//! command-line overrides and reports what the crawl left in the store.

use anyhow::Context;
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use trawl::config::{load_options_with_hash, CrawlOptions, StorageConfig};
use trawl::{Crawler, FetchStatus};

/// Trawl: a concurrent web crawler
///
/// Crawls from the given seed URLs with a pool of worker threads. With a
/// SQLite store, an interrupted crawl picks up where it left off.
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version)]
#[command(about = "A concurrent, resumable web crawler", long_about = None)]
struct Cli {
    /// Seed URLs to start crawling from
    #[arg(value_name = "URL", required_unless_present = "clean_db_only")]
    seeds: Vec<String>,

    /// Path to TOML options file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of fetch workers
    #[arg(short, long)]
    threads: Option<usize>,

    /// Do not follow links found on pages at this depth or deeper
    #[arg(short, long)]
    depth_limit: Option<u32>,

    /// Seconds to wait between requests (forces a single worker)
    #[arg(long)]
    delay: Option<f64>,

    /// Persist crawl state in this SQLite file
    #[arg(long, value_name = "PATH")]
    sqlite: Option<String>,

    /// Key prefix inside the SQLite store
    #[arg(long, default_value = "trawl")]
    prefix: String,

    /// Start a fresh crawl, discarding previous state
    #[arg(long)]
    fresh: bool,

    /// Wipe the stored crawl state and exit
    #[arg(long, conflicts_with = "fresh")]
    clean_db_only: bool,

    /// Skip links disallowed by robots.txt
    #[arg(long)]
    obey_robots: bool,

    /// Never follow links with a query string
    #[arg(long)]
    skip_query_strings: bool,

    /// Regex matched against link paths; matching links are never followed
    #[arg(long, value_name = "REGEX")]
    skip: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Applies command-line flags on top of the loaded options
    fn apply_to(&self, options: &mut CrawlOptions) {
        if let Some(threads) = self.threads {
            options.threads = threads;
        }
        if let Some(depth) = self.depth_limit {
            options.depth_limit = Some(depth);
        }
        if let Some(delay) = self.delay {
            options.delay = delay;
        }
        if let Some(path) = &self.sqlite {
            options.storage = StorageConfig::Sqlite {
                path: path.clone(),
                prefix: self.prefix.clone(),
            };
        }
        options.force_reset |= self.fresh;
        options.clean_db_only |= self.clean_db_only;
        options.obey_robots_txt |= self.obey_robots;
        options.skip_query_strings |= self.skip_query_strings;
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut options = match &cli.config {
        Some(path) => {
            let (options, hash) = load_options_with_hash(path)
                .with_context(|| format!("Failed to load options from {}", path.display()))?;
            setup_logging(cli.verbose, cli.quiet, options.verbose);
            tracing::info!("Options loaded from {} (hash: {})", path.display(), hash);
            options
        }
        None => {
            setup_logging(cli.verbose, cli.quiet, false);
            CrawlOptions::default()
        }
    };
    cli.apply_to(&mut options);

    let skip_patterns = cli
        .skip
        .iter()
        .map(|pattern| Regex::new(pattern))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid --skip pattern")?;

    let mut crawler = Crawler::new(options)?;
    crawler.skip_links_like(skip_patterns);
    crawler.on_every_page(|page| {
        match &page.status {
            Some(FetchStatus::Fetched { code }) => {
                tracing::info!("[{}] {} ({} links)", code, page.url, page.links.len())
            }
            Some(FetchStatus::Failed { reason, .. }) => {
                tracing::warn!("[failed] {}: {}", page.url, reason)
            }
            None => tracing::warn!("[no status] {}", page.url),
        }
    });

    let outcome = match crawler.run(&cli.seeds) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    if !cli.quiet {
        println!("=== Crawl Summary ===");
        println!("Pages processed: {}", outcome.pages_processed);
        println!("Complete:        {}", outcome.complete.len());
        println!("Pending:         {}", outcome.pending.len());
        if outcome.stopped {
            println!("Stopped early; rerun with the same store to resume.");
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool, verbose_option: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose.max(u8::from(verbose_option)) {
            0 => "trawl=info,warn",
            1 => "trawl=debug,info",
            2 => "trawl=trace,debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
