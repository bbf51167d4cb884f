use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use critique_api::AppState;
use critique_common::observability::init_logging;
use critique_config::{CritiqueConfig, CritiqueConfigLoader};
use critique_reviews::{JsonFileStore, Snapshot, SnapshotStore};
use tracing::info;

mod wiring;

const DEFAULT_CONFIG: &str = "critique.yaml";

#[derive(Debug, Parser)]
#[command(name = "critique", version, about = "SensCritique review scraper and API")]
struct Cli {
    /// Configuration file. Without it, `critique.yaml` is used when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the cached review snapshot over HTTP (default).
    Serve {
        /// Overrides the port of `server.bind`.
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Crawl once, write the snapshot and print a summary.
    Scrape {
        #[arg(long)]
        max_pages: Option<u32>,
        /// Defaults to `cache.path`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let loader = match &cli.config {
        Some(path) => CritiqueConfigLoader::new().with_file(path),
        None => CritiqueConfigLoader::new().with_optional_file(DEFAULT_CONFIG),
    };
    let cfg: CritiqueConfig = loader.load().context("loading configuration")?;

    let log_path = init_logging(wiring::log_config(&cfg.log)?)?;
    info!(target: "app", log = %log_path.display(), "app.start");

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(&cfg, port).await,
        Command::Scrape { max_pages, output } => scrape(&cfg, max_pages, output).await,
    }
}

async fn serve(cfg: &CritiqueConfig, port: Option<u16>) -> Result<()> {
    let parts = wiring::build(cfg)?;
    let state = AppState::new(parts.scraper, parts.store, parts.policy);
    state.preload().await;

    let mut addr: SocketAddr = cfg
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid server.bind {:?}", cfg.server.bind))?;
    if let Some(port) = port {
        addr.set_port(port);
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    println!("API SensCritique listening on http://{addr}/api/critiques");

    critique_api::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!(target: "app", "app.shutdown");
    })
    .await
    .context("server shutdown")?;
    Ok(())
}

async fn scrape(cfg: &CritiqueConfig, max_pages: Option<u32>, output: Option<PathBuf>) -> Result<()> {
    let parts = wiring::build(cfg)?;
    let max_pages = max_pages.unwrap_or(parts.policy.max_pages);

    let snapshot = parts
        .scraper
        .scrape_reviews(max_pages, parts.policy.delay)
        .await?;

    let store = match output {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::new(&cfg.cache.path),
    };
    store.save(&snapshot).await?;

    println!("{}", summary(&snapshot, &store));
    Ok(())
}

fn summary(snapshot: &Snapshot, store: &JsonFileStore) -> String {
    let mut lines = vec![
        format!("{} critiques for {}", snapshot.count(), snapshot.source_identity()),
        format!("updated at {}", snapshot.collected_at().format("%Y-%m-%d %H:%M:%S")),
        format!("saved to {}", store.path().display()),
    ];
    if let Some(latest) = snapshot.reviews().first() {
        let when = latest.date_display.as_deref().unwrap_or("date inconnue");
        lines.push(format!("latest: {} ({when})", latest.title));
    }
    lines.join("\n")
}
