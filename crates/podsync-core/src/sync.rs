//! Cached views of the library and the scheduled background refresh.

use std::future::Future;
use std::time::Duration;

use chrono::{Local, Timelike};
use serde::de::DeserializeOwned;
use serde::Serialize;

use podsync_api::spotify::types::Show;
use podsync_api::traits::AccessTokenProvider;

use crate::cache::{Cache, Peeked, Revalidated};
use crate::config::RefreshConfig;
use crate::error::CoreError;
use crate::library::{EpisodeFeed, PodcastLibrary};

pub const USER_SHOWS_KEY: &str = "spotify-podcasts-user-shows";
pub const RECENT_EPISODES_KEY: &str = "spotify-podcasts-recent-episodes";

/// Local hours `[start, end)` during which background refreshes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHours {
    pub start: u32,
    pub end: u32,
}

impl ActiveHours {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self { start: 7, end: 19 }
    }
}

impl From<&RefreshConfig> for ActiveHours {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            start: config.active_start_hour,
            end: config.active_end_hour,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Outside active hours; nothing was fetched.
    Skipped { hour: u32 },
    Refreshed {
        shows: usize,
        saved_episodes: usize,
        recent_episodes: usize,
    },
}

/// What a load returned.
#[derive(Debug)]
pub enum Loaded<T> {
    /// Served from cache without touching the network.
    Fresh(T),
    /// The cache was stale, missing or bypassed, so a fetch ran.
    Revalidated(Revalidated<T>),
}

impl<T> Loaded<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Loaded::Fresh(v) => Some(v),
            Loaded::Revalidated(r) => r.value(),
        }
    }

    pub fn notice(&self) -> Option<&CoreError> {
        match self {
            Loaded::Fresh(_) => None,
            Loaded::Revalidated(r) => r.notice(),
        }
    }
}

/// The library behind the local cache.
pub struct PodcastSync<A> {
    library: PodcastLibrary<A>,
    cache: Cache,
    ttl: Duration,
    hours: ActiveHours,
}

impl<A: AccessTokenProvider> PodcastSync<A> {
    pub fn new(library: PodcastLibrary<A>, cache: Cache, ttl: Duration, hours: ActiveHours) -> Self {
        Self {
            library,
            cache,
            ttl,
            hours,
        }
    }

    /// Background refresh at the current local hour.
    pub async fn refresh_all(&self) -> Result<RefreshOutcome, CoreError> {
        self.refresh_all_at(Local::now().hour()).await
    }

    /// Refresh both cache keys from one feed fetch.
    ///
    /// Nothing is written unless the whole fetch succeeds, and both keys are
    /// written in a single transaction.
    pub async fn refresh_all_at(&self, hour: u32) -> Result<RefreshOutcome, CoreError> {
        if !self.hours.contains(hour) {
            tracing::debug!(hour, "outside active hours, skipping refresh");
            return Ok(RefreshOutcome::Skipped { hour });
        }

        let (shows, feed) = self.library.episode_feed().await.inspect_err(|e| {
            tracing::warn!(error = %e, "background refresh failed");
        })?;

        let entries = vec![
            (USER_SHOWS_KEY.to_owned(), Cache::encode(&shows)?),
            (RECENT_EPISODES_KEY.to_owned(), Cache::encode(&feed)?),
        ];
        self.cache.set_encoded(entries).await?;

        let outcome = RefreshOutcome::Refreshed {
            shows: shows.len(),
            saved_episodes: feed.saved_episodes.len(),
            recent_episodes: feed.recent_episodes.len(),
        };
        tracing::info!(?outcome, "podcast data refreshed");
        Ok(outcome)
    }

    pub async fn peek_shows(&self) -> Result<Option<Peeked<Vec<Show>>>, CoreError> {
        self.cache.peek(USER_SHOWS_KEY, self.ttl).await
    }

    pub async fn revalidate_shows(&self) -> Revalidated<Vec<Show>> {
        self.cache
            .revalidate(USER_SHOWS_KEY, || self.library.saved_shows())
            .await
    }

    pub async fn peek_feed(&self) -> Result<Option<Peeked<EpisodeFeed>>, CoreError> {
        self.cache.peek(RECENT_EPISODES_KEY, self.ttl).await
    }

    /// Refetch the feed. Shows come along with it, so both keys are updated.
    pub async fn revalidate_feed(&self) -> Revalidated<EpisodeFeed> {
        self.cache
            .revalidate(RECENT_EPISODES_KEY, || async {
                let (shows, feed) = self.library.episode_feed().await?;
                if let Err(e) = self.cache.set(USER_SHOWS_KEY, &shows).await {
                    tracing::warn!(error = %e, "failed to cache saved shows");
                }
                Ok::<_, CoreError>(feed)
            })
            .await
    }

    /// Saved shows, served from cache while fresh.
    ///
    /// A stale entry is handed to `on_stale` before the refetch starts so the
    /// caller can show it right away.
    pub async fn load_shows(
        &self,
        force: bool,
        on_stale: impl FnOnce(&Vec<Show>),
    ) -> Result<Loaded<Vec<Show>>, CoreError> {
        self.load(self.peek_shows().await?, force, on_stale, || {
            self.revalidate_shows()
        })
        .await
    }

    /// The episode feed, served from cache while fresh.
    pub async fn load_episode_feed(
        &self,
        force: bool,
        on_stale: impl FnOnce(&EpisodeFeed),
    ) -> Result<Loaded<EpisodeFeed>, CoreError> {
        self.load(self.peek_feed().await?, force, on_stale, || {
            self.revalidate_feed()
        })
        .await
    }

    async fn load<T, F, Fut>(
        &self,
        cached: Option<Peeked<T>>,
        force: bool,
        on_stale: impl FnOnce(&T),
        revalidate: F,
    ) -> Result<Loaded<T>, CoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Revalidated<T>>,
    {
        match cached {
            Some(peeked) if peeked.fresh && !force => return Ok(Loaded::Fresh(peeked.value)),
            Some(peeked) => on_stale(&peeked.value),
            None => {}
        }
        Ok(Loaded::Revalidated(revalidate().await))
    }
}
