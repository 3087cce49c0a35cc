use std::collections::HashMap;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::batch::{resolve_batch, BATCH_SIZE};
use super::error::SpotifyError;
use super::paging::{walk, Page};
use crate::traits::AccessTokenProvider;

/// Outcome of a lookup that may legitimately find nothing.
///
/// A 404 is an answer, not a failure: probing `audiobooks/{id}` with a show id
/// is how shows and audiobooks are told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Found(T),
    NotFound,
}

impl<T> Fetched<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Fetched::Found(value) => Some(value),
            Fetched::NotFound => None,
        }
    }
}

/// Spotify Web API client.
///
/// Carries its own token source instead of relying on process-wide state;
/// every request asks the provider for a bearer token first.
pub struct SpotifyClient<A> {
    tokens: A,
    http: Client,
    base_url: String,
}

impl<A: AccessTokenProvider> SpotifyClient<A> {
    /// Client rooted at `base_url` (e.g. `https://api.spotify.com/v1/`).
    pub fn with_base_url(tokens: A, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            tokens,
            http: Client::new(),
            base_url,
        }
    }

    /// Paths are always resolved against the base; the bearer token never
    /// leaves for another host.
    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET base_url + path` with a bearer token.
    ///
    /// 200 parses into [`Fetched::Found`], 404 becomes [`Fetched::NotFound`],
    /// every other status is [`SpotifyError::Api`] with the response body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Fetched<T>, SpotifyError> {
        if path.is_empty() {
            return Err(SpotifyError::InvalidPath);
        }

        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .get(self.url_for(path))
            .bearer_auth(token)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<T>()
                .await
                .map(Fetched::Found)
                .map_err(|e| SpotifyError::Parse(e.to_string())),
            StatusCode::NOT_FOUND => Ok(Fetched::NotFound),
            status => {
                let status = status.as_u16();
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(status, path, "Spotify API error");
                Err(SpotifyError::Api { status, body })
            }
        }
    }

    /// Like [`get`](Self::get) but a missing resource is an error.
    pub async fn require<T: DeserializeOwned>(&self, path: &str) -> Result<T, SpotifyError> {
        match self.get(path).await? {
            Fetched::Found(value) => Ok(value),
            Fetched::NotFound => Err(SpotifyError::Api {
                status: 404,
                body: format!("not found: {path}"),
            }),
        }
    }

    /// [`get`](Self::get) with one re-authorization after a 401.
    ///
    /// The stored tokens are dropped before retrying, so the second attempt
    /// runs the full authorization flow rather than reusing a revoked token.
    pub async fn get_reauth<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Fetched<T>, SpotifyError> {
        match self.get(path).await {
            Err(SpotifyError::Api { status: 401, .. }) => {
                tracing::info!(path, "access token rejected, re-authorizing");
                self.tokens.invalidate().await?;
                self.get(path).await
            }
            other => other,
        }
    }

    /// Every item of a paged listing, following `next` links to the end.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        first_path: &str,
    ) -> Result<Vec<T>, SpotifyError> {
        walk(first_path, &self.base_url, |path| async move {
            self.require::<Page<T>>(&path).await
        })
        .await
    }

    /// Look up every distinct id via `path_for(id)`, dropping misses and failures.
    pub async fn resolve_ids<T, I, S>(
        &self,
        ids: I,
        path_for: impl Fn(&str) -> String,
    ) -> HashMap<String, T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        resolve_batch(ids, BATCH_SIZE, |id| {
            let path = path_for(&id);
            async move { self.get::<T>(&path).await }
        })
        .await
    }
}

/// Percent-encode a single path segment (ids, show ids).
pub fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
