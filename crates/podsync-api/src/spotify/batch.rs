//! Per-id lookups in fixed-size concurrent chunks.
//!
//! Spotify's multi-id endpoints (`/episodes?ids=...`) are being removed, so
//! every id is looked up on its own; chunking keeps the number of requests
//! in flight bounded.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;

use super::client::Fetched;

/// Ids resolved concurrently per chunk.
pub const BATCH_SIZE: usize = 50;

/// Remove duplicates, keeping the first occurrence of each id.
pub fn unique_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter_map(|id| {
            let id = id.as_ref();
            seen.insert(id.to_owned()).then(|| id.to_owned())
        })
        .collect()
}

/// Resolve every distinct id with `fetch`, `chunk_size` at a time.
///
/// A chunk's lookups run concurrently and all finish before the next chunk
/// starts. Ids that come back [`Fetched::NotFound`] or fail are left out of
/// the map; they are neither retried nor reported as errors.
pub async fn resolve_batch<T, E, I, S, F, Fut>(
    ids: I,
    chunk_size: usize,
    fetch: F,
) -> HashMap<String, T>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    E: Display,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Fetched<T>, E>>,
{
    let ids = unique_ids(ids);
    let mut resolved = HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(chunk_size.max(1)) {
        let lookups = chunk.iter().map(|id| {
            let fut = fetch(id.clone());
            async move { (id, fut.await) }
        });

        for (id, outcome) in join_all(lookups).await {
            match outcome {
                Ok(Fetched::Found(value)) => {
                    resolved.insert(id.clone(), value);
                }
                Ok(Fetched::NotFound) => {
                    tracing::debug!(%id, "batch lookup: not found");
                }
                Err(e) => {
                    tracing::debug!(%id, error = %e, "batch lookup failed, skipping");
                }
            }
        }
    }

    resolved
}
