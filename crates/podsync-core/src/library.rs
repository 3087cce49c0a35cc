//! The user's podcast library as assembled from several Spotify endpoints.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use podsync_api::spotify::client::encode_segment;
use podsync_api::spotify::paging::Page;
use podsync_api::spotify::types::{
    AudiobookProbe, Episode, Profile, SavedEpisode, SavedShow, SearchItem, SearchKind,
    SearchResponse, Show,
};
use podsync_api::spotify::{Fetched, SpotifyClient, SpotifyError};
use podsync_api::traits::AccessTokenProvider;

use crate::error::CoreError;

/// Shows whose latest episodes are fetched concurrently.
pub const SHOW_BATCH_SIZE: usize = 5;
/// Latest episodes taken from each saved show.
pub const EPISODES_PER_SHOW: u32 = 3;
/// Page size for the saved-shows and saved-episodes listings.
const PAGE_LIMIT: u32 = 50;

/// An episode as listed to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeListItem {
    pub episode: Episode,
    pub show_name: Option<String>,
    pub show_url: Option<String>,
    pub is_saved: bool,
}

impl EpisodeListItem {
    fn from_show(episode: Episode, show: &Show, is_saved: bool) -> Self {
        Self {
            show_name: Some(show.name.clone()),
            show_url: show.external_urls.spotify.clone(),
            episode,
            is_saved,
        }
    }

    fn saved(episode: Episode) -> Self {
        let show = episode.show.as_ref();
        Self {
            show_name: show.map(|s| s.name.clone()),
            show_url: show.and_then(|s| s.external_urls.spotify.clone()),
            episode,
            is_saved: true,
        }
    }
}

/// Saved episodes plus the latest episodes of every saved show.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeFeed {
    pub saved_episodes: Vec<EpisodeListItem>,
    pub recent_episodes: Vec<EpisodeListItem>,
}

/// Read-only view of the user's Spotify podcast library.
pub struct PodcastLibrary<A> {
    client: SpotifyClient<A>,
}

impl<A: AccessTokenProvider> PodcastLibrary<A> {
    pub fn new(client: SpotifyClient<A>) -> Self {
        Self { client }
    }

    /// The signed-in user. Re-authorizes once if the token was revoked.
    pub async fn profile(&self) -> Result<Profile, CoreError> {
        match self.client.get_reauth::<Profile>("me").await? {
            Fetched::Found(profile) => Ok(profile),
            Fetched::NotFound => Err(SpotifyError::Api {
                status: 404,
                body: "profile not found".into(),
            }
            .into()),
        }
    }

    /// Every saved show, audiobooks excluded.
    ///
    /// `/me/shows` lists audiobooks too. The only way to tell them apart is
    /// to ask `/audiobooks/{id}`: a hit means audiobook, a 404 means show.
    pub async fn saved_shows(&self) -> Result<Vec<Show>, CoreError> {
        let saved: Vec<SavedShow> = self
            .client
            .fetch_all(&format!("me/shows?limit={PAGE_LIMIT}"))
            .await?;
        let shows: Vec<Show> = saved.into_iter().map(|s| s.show).collect();

        let audiobooks = self.audiobook_ids(shows.iter().map(|s| s.id.as_str())).await;
        if !audiobooks.is_empty() {
            tracing::debug!(count = audiobooks.len(), "excluding audiobooks from saved shows");
        }

        Ok(shows
            .into_iter()
            .filter(|s| !audiobooks.contains(&s.id))
            .collect())
    }

    async fn audiobook_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
        let found: HashMap<String, AudiobookProbe> = self
            .client
            .resolve_ids(ids, |id| format!("audiobooks/{}", encode_segment(id)))
            .await;
        found.into_keys().collect()
    }

    /// Every saved episode with a usable id and name.
    pub async fn saved_episodes(&self) -> Result<Vec<Episode>, CoreError> {
        let saved: Vec<SavedEpisode> = self
            .client
            .fetch_all(&format!("me/episodes?limit={PAGE_LIMIT}"))
            .await?;

        Ok(saved
            .into_iter()
            .filter_map(|item| item.episode)
            .filter(Episode::is_listable)
            .collect())
    }

    /// The latest `limit` episodes of one show.
    pub async fn show_episodes(&self, show_id: &str, limit: u32) -> Result<Vec<Episode>, CoreError> {
        let path = format!("shows/{}/episodes?limit={limit}", encode_segment(show_id));
        let page: Page<Option<Episode>> = self.client.require(&path).await?;
        Ok(page.items.into_iter().flatten().collect())
    }

    /// Full episode objects (with resume points) keyed by id; misses are omitted.
    pub async fn episode_details<I, S>(&self, ids: I) -> HashMap<String, Episode>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.client
            .resolve_ids(ids, |id| format!("episodes/{}", encode_segment(id)))
            .await
    }

    /// Catalog search, flattened and tagged by result kind.
    pub async fn search(
        &self,
        query: &str,
        kinds: &[SearchKind],
        limit: u32,
    ) -> Result<Vec<SearchItem>, CoreError> {
        let kinds = if kinds.is_empty() {
            SearchKind::ALL
        } else {
            kinds
        };
        let types = kinds
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let query_string = form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("type", &types)
            .append_pair("limit", &limit.to_string())
            .finish();

        let resp: SearchResponse = self.client.require(&format!("search?{query_string}")).await?;
        Ok(resp.into_items())
    }

    /// Saved shows and the combined episode feed built from them.
    ///
    /// A show whose episode listing fails contributes nothing; a failure of
    /// either top-level listing fails the whole feed.
    pub async fn episode_feed(&self) -> Result<(Vec<Show>, EpisodeFeed), CoreError> {
        let (shows, saved) = tokio::try_join!(self.saved_shows(), self.saved_episodes())?;

        let saved_ids: HashSet<String> = saved.iter().map(|e| e.id.clone()).collect();
        let mut saved_episodes: Vec<EpisodeListItem> =
            saved.into_iter().map(EpisodeListItem::saved).collect();

        let mut recent_episodes = Vec::new();
        for chunk in shows.chunks(SHOW_BATCH_SIZE) {
            let listings = chunk.iter().map(|show| async move {
                (show, self.show_episodes(&show.id, EPISODES_PER_SHOW).await)
            });

            for (show, listing) in join_all(listings).await {
                match listing {
                    Ok(episodes) => recent_episodes.extend(
                        episodes
                            .into_iter()
                            .filter(Episode::is_listable)
                            .map(|ep| {
                                let is_saved = saved_ids.contains(&ep.id);
                                EpisodeListItem::from_show(ep, show, is_saved)
                            }),
                    ),
                    Err(e) => {
                        tracing::debug!(show = %show.id, error = %e, "skipping show episodes");
                    }
                }
            }
        }

        let ids: Vec<String> = saved_episodes
            .iter()
            .chain(recent_episodes.iter())
            .map(|item| item.episode.id.clone())
            .collect();
        let details = self.episode_details(&ids).await;

        for item in saved_episodes.iter_mut().chain(recent_episodes.iter_mut()) {
            if let Some(detail) = details.get(&item.episode.id) {
                item.episode.resume_point = detail.resume_point.clone();
            }
        }

        Ok((
            shows,
            EpisodeFeed {
                saved_episodes,
                recent_episodes,
            },
        ))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Local Spotify stand-in shared by the library and sync tests.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use podsync_api::spotify::{AuthError, SpotifyClient};
    use podsync_api::traits::AccessTokenProvider;
    use serde_json::json;

    pub struct StaticToken;

    impl AccessTokenProvider for StaticToken {
        async fn access_token(&self) -> Result<String, AuthError> {
            Ok("tok".into())
        }

        async fn invalidate(&self) -> Result<(), AuthError> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeSpotify {
        pub episode_lookups: AtomicUsize,
        /// When set, `/me/shows` answers 503.
        pub shows_down: AtomicBool,
    }

    impl FakeSpotify {
        pub fn set_shows_down(&self, down: bool) {
            self.shows_down.store(down, Ordering::SeqCst);
        }
    }

    async fn me_shows(State(state): State<Arc<FakeSpotify>>) -> Response {
        if state.shows_down.load(Ordering::SeqCst) {
            return (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response();
        }
        Json(json!({
            "items": [
                {"show": {"id": "sh1", "name": "Daily News", "external_urls": {"spotify": "https://open.spotify.com/show/sh1"}}},
                {"show": {"id": "ab1", "name": "An Audiobook"}},
                {"show": {"id": "sh2", "name": "Broken Show"}}
            ],
            "next": null
        }))
        .into_response()
    }

    async fn me_episodes() -> Json<serde_json::Value> {
        Json(json!({
            "items": [
                {"episode": {"id": "e1", "name": "Saved One", "show": {"id": "sh1", "name": "Daily News", "external_urls": {"spotify": "https://open.spotify.com/show/sh1"}}}},
                {"episode": null},
                {"episode": {"id": "", "name": "Husk"}}
            ],
            "next": null
        }))
    }

    async fn audiobook(Path(id): Path<String>) -> Response {
        if id == "ab1" {
            Json(json!({"id": "ab1", "name": "An Audiobook"})).into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    }

    async fn show_episodes(Path(id): Path<String>) -> Response {
        match id.as_str() {
            "sh1" => Json(json!({
                "items": [
                    {"id": "e1", "name": "Saved One"},
                    {"id": "e2", "name": "Fresh One"},
                    null
                ],
                "next": "https://api.spotify.com/v1/shows/sh1/episodes?offset=3"
            }))
            .into_response(),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        }
    }

    async fn episode(State(state): State<Arc<FakeSpotify>>, Path(id): Path<String>) -> Response {
        state.episode_lookups.fetch_add(1, Ordering::SeqCst);
        match id.as_str() {
            "e1" => Json(json!({"id": "e1", "name": "Saved One", "resume_point": {"fully_played": true, "resume_position_ms": 0}})).into_response(),
            "e2" => Json(json!({"id": "e2", "name": "Fresh One", "resume_point": {"fully_played": false, "resume_position_ms": 4200}})).into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn search() -> Json<serde_json::Value> {
        Json(json!({
            "shows": {"items": [{"id": "sh1", "name": "Daily News"}], "next": null},
            "episodes": {"items": [{"id": "e2", "name": "Fresh One"}], "next": null}
        }))
    }

    pub async fn spawn() -> (SpotifyClient<StaticToken>, Arc<FakeSpotify>) {
        let state = Arc::new(FakeSpotify::default());
        let router = Router::new()
            .route("/v1/me", get(|| async { Json(json!({"id": "user-1", "display_name": "Dee"})) }))
            .route("/v1/me/shows", get(me_shows))
            .route("/v1/me/episodes", get(me_episodes))
            .route("/v1/audiobooks/{id}", get(audiobook))
            .route("/v1/shows/{id}/episodes", get(show_episodes))
            .route("/v1/episodes/{id}", get(episode))
            .route("/v1/search", get(search))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (
            SpotifyClient::with_base_url(StaticToken, format!("http://{addr}/v1/")),
            state,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::test_support::spawn;
    use super::*;

    #[tokio::test]
    async fn test_profile() {
        let (client, _) = spawn().await;
        let profile = PodcastLibrary::new(client).profile().await.unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Dee"));
    }

    #[tokio::test]
    async fn test_saved_shows_exclude_audiobooks() {
        let (client, _) = spawn().await;
        let shows = PodcastLibrary::new(client).saved_shows().await.unwrap();

        let ids: Vec<_> = shows.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["sh1", "sh2"]);
    }

    #[tokio::test]
    async fn test_saved_episodes_drop_husks() {
        let (client, _) = spawn().await;
        let episodes = PodcastLibrary::new(client).saved_episodes().await.unwrap();

        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].id, "e1");
    }

    #[tokio::test]
    async fn test_episode_feed() {
        let (client, fake) = spawn().await;
        let (shows, feed) = PodcastLibrary::new(client).episode_feed().await.unwrap();

        assert_eq!(shows.len(), 2);

        assert_eq!(feed.saved_episodes.len(), 1);
        let saved = &feed.saved_episodes[0];
        assert!(saved.is_saved);
        assert_eq!(saved.show_name.as_deref(), Some("Daily News"));
        assert!(saved.episode.is_fully_played());

        // sh2 fails and contributes nothing; sh1 yields two listable episodes.
        let recent: Vec<_> = feed
            .recent_episodes
            .iter()
            .map(|i| (i.episode.id.as_str(), i.is_saved))
            .collect();
        assert_eq!(recent, [("e1", true), ("e2", false)]);
        assert_eq!(
            feed.recent_episodes[1]
                .episode
                .resume_point
                .as_ref()
                .and_then(|r| r.resume_position_ms),
            Some(4200)
        );
        assert_eq!(
            feed.recent_episodes[1].show_url.as_deref(),
            Some("https://open.spotify.com/show/sh1")
        );

        // e1 appears twice in the feed but is looked up once.
        assert_eq!(fake.episode_lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_search_tags_results() {
        let (client, _) = spawn().await;
        let items = PodcastLibrary::new(client)
            .search("news", &[SearchKind::Show, SearchKind::Episode], 10)
            .await
            .unwrap();

        let tagged: Vec<_> = items.iter().map(|i| (i.id.as_str(), i.kind)).collect();
        assert_eq!(
            tagged,
            [
                ("sh1", Some(SearchKind::Show)),
                ("e2", Some(SearchKind::Episode))
            ]
        );
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let (client, fake) = spawn().await;
        fake.set_shows_down(true);

        let err = PodcastLibrary::new(client).episode_feed().await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Api(SpotifyError::Api { status: 503, .. })
        ));
    }
}
