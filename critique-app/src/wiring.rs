use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use critique_api::RefreshPolicy;
use critique_common::{LogConfig, LogFormat};
use critique_config::{CrawlMode, CritiqueConfig, LogSettings};
use critique_http::HttpClient;
use critique_reviews::{HttpPageFetcher, JsonFileStore, ParseMode, Scraper};
use url::Url;

/// Everything the commands need, built once from configuration.
pub struct Components {
    pub scraper: Scraper,
    pub store: Arc<JsonFileStore>,
    pub policy: RefreshPolicy,
}

pub fn build(cfg: &CritiqueConfig) -> Result<Components> {
    let origin = Url::parse(&cfg.source.origin)
        .with_context(|| format!("invalid source.origin {:?}", cfg.source.origin))?;

    let client = HttpClient::new(origin.as_str())?
        .with_timeout(cfg.http.timeout())
        .with_retries(cfg.http.retries);
    let fetcher = HttpPageFetcher::new(client, &cfg.http.user_agent)?;

    let scraper = Scraper::new(
        Arc::new(fetcher),
        origin,
        &cfg.source.username,
        parse_mode(cfg.crawl.mode),
    )?;

    Ok(Components {
        scraper,
        store: Arc::new(JsonFileStore::new(&cfg.cache.path)),
        policy: RefreshPolicy {
            max_pages: cfg.crawl.max_pages,
            delay: cfg.crawl.delay(),
            ttl: cfg.cache.ttl(),
        },
    })
}

fn parse_mode(mode: CrawlMode) -> ParseMode {
    match mode {
        CrawlMode::Strict => ParseMode::Strict,
        CrawlMode::Permissive => ParseMode::Permissive,
    }
}

pub fn log_config(settings: &LogSettings) -> Result<LogConfig> {
    let format: LogFormat = settings.format.parse().map_err(|e: String| anyhow!(e))?;
    Ok(LogConfig {
        app_name: "critique",
        log_dir: settings.dir.as_ref().map(PathBuf::from),
        emit_stderr: settings.stderr,
        format,
        default_filter: settings.filter.clone(),
    })
}
