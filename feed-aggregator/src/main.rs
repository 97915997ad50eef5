mod cli;

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use clap::Parser;
use cli::{Cli, Command};
use feed_aggregator::{
    discovery, subscriptions, Aggregator, EntrySink, FetchConfig, HttpFetcher, JsonLinesSink, PollConfig,
    Source, SourceStatus, SqliteStateStore, StateStore,
};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Poll {
            min_interval,
            concurrency,
            fetch_timeout,
            output,
        } => {
            let sources = subscriptions::load_subscriptions(&cli.subscriptions)
                .with_context(|| format!("reading subscriptions from {}", cli.subscriptions.display()))?;
            info!("Polling {} subscriptions", sources.len());

            let min_interval = TimeDelta::try_seconds(min_interval)
                .with_context(|| format!("--min-interval {} is out of range", min_interval))?;

            let fetcher = HttpFetcher::new(FetchConfig::default())?;
            let aggregator = Aggregator::new(PollConfig {
                min_interval,
                max_concurrent_fetches: concurrency,
                fetch_timeout: fetch_timeout.map(std::time::Duration::from_secs),
            });

            let outcome = aggregator
                .poll_with_store_at(&sources, &fetcher, &cli.state_db, Utc::now())
                .await
                .with_context(|| format!("polling with state at {}", cli.state_db.display()))?;

            for report in &outcome.report.sources {
                if let SourceStatus::Failed { error } = &report.status {
                    warn!(source = %report.source, "Poll failed: {}", error);
                }
            }

            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    JsonLinesSink::new(BufWriter::new(file)).deliver(&outcome.entries)?;
                }
                None => JsonLinesSink::new(io::stdout().lock()).deliver(&outcome.entries)?,
            }

            info!("Emitted {} new entries", outcome.entries.len());
        }
        Command::Subscribe { uri, no_discover } => {
            let mut sources = load_or_empty(&cli.subscriptions)?;
            let feed = if no_discover {
                Source::from(uri.trim())
            } else {
                let fetcher = HttpFetcher::new(FetchConfig::default())?;
                let found = discovery::discover_feeds(&fetcher, &uri).await?;
                subscriptions::single_feed(&uri, found)?
            };
            subscriptions::subscribe(&mut sources, feed)?;
            subscriptions::save_subscriptions(&cli.subscriptions, &sources)?;
        }
        Command::Unsubscribe { uri } => {
            let mut sources = load_or_empty(&cli.subscriptions)?;
            subscriptions::unsubscribe(&mut sources, &Source::from(uri.trim()))?;
            subscriptions::save_subscriptions(&cli.subscriptions, &sources)?;
        }
        Command::List => {
            for source in load_or_empty(&cli.subscriptions)? {
                println!("{}", source);
            }
        }
        Command::Prune { older_than_days } => {
            let cutoff = TimeDelta::try_days(older_than_days)
                .and_then(|age| Utc::now().checked_sub_signed(age))
                .with_context(|| format!("--older-than-days {} is out of range", older_than_days))?;
            let mut store = SqliteStateStore::open(&cli.state_db).await?;
            let removed = store.prune_seen_before(cutoff).await?;
            store.close().await?;
            info!("Removed {} seen-entry records", removed);
        }
    }

    Ok(())
}

fn load_or_empty(path: &Path) -> anyhow::Result<Vec<Source>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(subscriptions::load_subscriptions(path)?)
}
