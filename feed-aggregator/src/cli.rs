use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Poll subscribed feeds and hand on the entries not seen before.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite file holding poll history and seen entries
    #[arg(long, env = "AGG_STATE_DB", default_value = "aggregator.db", global = true)]
    pub state_db: PathBuf,

    /// Subscription list, one feed URI per line
    #[arg(long, env = "AGG_SUBSCRIPTIONS", default_value = "feeds.txt", global = true)]
    pub subscriptions: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one poll cycle over every subscription
    Poll {
        /// Minimum seconds between two polls of the same feed
        #[arg(long, default_value_t = 3600, value_parser = clap::value_parser!(i64).range(0..))]
        min_interval: i64,

        /// Feeds fetched at the same time
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Give up on a single feed after this many seconds
        #[arg(long)]
        fetch_timeout: Option<u64>,

        /// Write new entries here as JSON lines instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add a feed to the subscription list, finding it through the page's
    /// feed links when the URI is not a feed itself
    Subscribe {
        uri: String,

        /// Store the URI as given without fetching it
        #[arg(long)]
        no_discover: bool,
    },

    /// Remove a feed URI from the subscription list
    Unsubscribe { uri: String },

    /// Print the subscription list
    List,

    /// Forget seen entries first seen more than N days ago
    Prune {
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        older_than_days: i64,
    },
}
