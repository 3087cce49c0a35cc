//! Following Spotify's `next` links until a listing is exhausted.

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::error::SpotifyError;

/// One page of a Spotify paging object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u32>,
}

/// Turn an absolute `next` URL back into a path relative to `api_base`.
///
/// Returns `None` for URLs outside `api_base`; those are never requested.
pub fn strip_api_base<'a>(url: &'a str, api_base: &str) -> Option<&'a str> {
    url.strip_prefix(api_base)
}

/// Fetch `first_path`, then every page its `next` chain points at.
///
/// Items are accumulated in server order. Empty pages that still carry a
/// `next` link do not stop the walk; only a null `next` does. A `next` link
/// outside `api_base` ends the walk with [`SpotifyError::ForeignLink`].
pub async fn walk<T, E, F, Fut>(first_path: &str, api_base: &str, mut fetch: F) -> Result<Vec<T>, E>
where
    E: From<SpotifyError>,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut page = fetch(first_path.to_owned()).await?;
    let mut items = std::mem::take(&mut page.items);
    let mut pages = 1usize;

    while let Some(next) = page.next.take() {
        let Some(path) = strip_api_base(&next, api_base) else {
            tracing::warn!(next = %next, "next link leaves the API base, stopping");
            return Err(SpotifyError::ForeignLink(next).into());
        };
        page = fetch(path.to_owned()).await?;
        pages += 1;
        items.append(&mut page.items);
    }

    tracing::debug!(pages, items = items.len(), first_path, "pagination finished");
    Ok(items)
}
