use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use podsync_api::spotify::types::SearchKind;

#[derive(Debug, Parser)]
#[command(name = "podsync", version, about = "Browse your Spotify podcasts from the terminal")]
pub struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authorize with Spotify and show who is signed in.
    Connect {
        /// Copy the access token to the clipboard.
        #[arg(long)]
        copy_token: bool,
    },
    /// List saved shows.
    Shows(RefreshArgs),
    /// List saved episodes and the latest episodes of saved shows.
    Episodes {
        #[command(flatten)]
        refresh: RefreshArgs,

        /// Only saved episodes.
        #[arg(long, conflicts_with = "subscribed")]
        saved: bool,

        /// Only recent episodes from saved shows.
        #[arg(long)]
        subscribed: bool,
    },
    /// Search the Spotify catalog.
    Search {
        query: String,

        /// Result types to include (repeatable). Defaults to all.
        #[arg(long = "type", value_name = "TYPE")]
        kinds: Vec<SearchKind>,

        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=50))]
        limit: u32,
    },
    /// Refresh cached shows and episodes (only during active hours).
    Refresh,
    /// Forget stored Spotify tokens.
    Logout,
    /// Write the default config file if missing and print its path.
    Config,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Ignore the cache and fetch from Spotify.
    #[arg(long)]
    pub refresh: bool,
}
