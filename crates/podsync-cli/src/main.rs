mod cli;
mod output;

use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use podsync_api::spotify::auth::{BrowserPrompt, SpotifyTokenEndpoint};
use podsync_api::spotify::{AuthError, Authorizer, SpotifyClient, SpotifyError};
use podsync_api::traits::TokenStore;
use podsync_core::cache::{Cache, Revalidated};
use podsync_core::config::AppConfig;
use podsync_core::db::KvHandle;
use podsync_core::error::CoreError;
use podsync_core::library::PodcastLibrary;
use podsync_core::sync::{ActiveHours, Loaded, PodcastSync, RefreshOutcome};
use podsync_core::token_store::KvTokenStore;

use crate::cli::{Cli, Commands};

type SpotifyAuth = Authorizer<SpotifyTokenEndpoint, BrowserPrompt, KvTokenStore>;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("clipboard unavailable: {0}")]
    Clipboard(#[from] arboard::Error),
}

impl CliError {
    /// The user declined consent, however deep the error was wrapped.
    fn is_cancelled(&self) -> bool {
        matches!(
            self,
            CliError::Auth(AuthError::Cancelled)
                | CliError::Core(CoreError::Auth(AuthError::Cancelled))
                | CliError::Core(CoreError::Api(SpotifyError::Auth(AuthError::Cancelled)))
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            eprintln!("Authorization cancelled.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(AppConfig::config_path);

    if let Commands::Config = cli.command {
        if !config_path.exists() {
            AppConfig::default().save_to(&config_path)?;
        }
        println!("{}", config_path.display());
        return Ok(());
    }

    let config = AppConfig::load_from(&config_path)?;
    tracing::debug!(path = %config_path.display(), "config loaded");
    let kv = KvHandle::open(&AppConfig::ensure_db_path()?)?;

    if let Commands::Logout = cli.command {
        KvTokenStore::new(kv).clear().await?;
        println!("Signed out of Spotify.");
        return Ok(());
    }

    let auth = authorizer(&config, kv.clone())?;
    let library = PodcastLibrary::new(SpotifyClient::with_base_url(
        auth.clone(),
        config.spotify.api_base.clone(),
    ));

    match cli.command {
        Commands::Connect { copy_token } => {
            let token = auth.authorize().await?;
            let profile = library.profile().await?;
            let who = profile
                .display_name
                .or(profile.id)
                .unwrap_or_else(|| "unknown user".into());
            println!("Connected to Spotify as {who}.");

            if copy_token {
                arboard::Clipboard::new()?.set_text(token)?;
                println!("Access token copied to clipboard.");
            }
        }
        Commands::Search {
            query,
            kinds,
            limit,
        } => {
            let items = library.search(&query, &kinds, limit).await?;
            output::print_search(&items);
        }
        command => {
            let sync = PodcastSync::new(
                library,
                Cache::new(kv),
                config.cache.ttl(),
                ActiveHours::from(&config.refresh),
            );
            run_cached(&sync, command).await?;
        }
    }

    Ok(())
}

async fn run_cached(sync: &PodcastSync<SpotifyAuth>, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Shows(args) => {
            let loaded = sync
                .load_shows(args.refresh, |stale| output::print_shows(stale, true))
                .await?;
            if let Some(shows) = settle(loaded)? {
                output::print_shows(&shows, false);
            }
        }
        Commands::Episodes {
            refresh,
            saved,
            subscribed,
        } => {
            let filter = output::FeedFilter::new(saved, subscribed);
            let loaded = sync
                .load_episode_feed(refresh.refresh, |stale| {
                    output::print_feed(stale, filter, true)
                })
                .await?;
            if let Some(feed) = settle(loaded)? {
                output::print_feed(&feed, filter, false);
            }
        }
        Commands::Refresh => match sync.refresh_all().await? {
            RefreshOutcome::Skipped { hour } => {
                println!("Skipped: {hour}:00 is outside the active refresh hours.");
            }
            RefreshOutcome::Refreshed {
                shows,
                saved_episodes,
                recent_episodes,
            } => {
                println!(
                    "Refreshed {shows} shows, {saved_episodes} saved and {recent_episodes} recent episodes."
                );
            }
        },
        _ => unreachable!("handled before the cache is opened"),
    }
    Ok(())
}

/// The value still to print, if any. A failed refresh that fell back to the
/// cached value is only reported, since that value is already on screen.
fn settle<T>(loaded: Loaded<T>) -> Result<Option<T>, CliError> {
    match loaded {
        Loaded::Fresh(value) | Loaded::Revalidated(Revalidated::Updated(value)) => Ok(Some(value)),
        Loaded::Revalidated(Revalidated::KeptStale { error, .. }) => {
            eprintln!("Could not refresh from Spotify: {error}");
            Ok(None)
        }
        Loaded::Revalidated(Revalidated::Failed(error)) => Err(error.into()),
    }
}

fn authorizer(config: &AppConfig, kv: KvHandle) -> Result<SpotifyAuth, CliError> {
    let client_id = config.client_id()?;
    let accounts_base = config.spotify.accounts_base.as_str();

    Ok(Authorizer::new(
        SpotifyTokenEndpoint::new(client_id, accounts_base),
        BrowserPrompt::new(config.spotify.redirect_port),
        KvTokenStore::new(kv),
        client_id,
        accounts_base,
    ))
}
