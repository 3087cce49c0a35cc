use serde::{Deserialize, Serialize};

use super::paging::Page;

// ── Shared pieces ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub fully_played: Option<bool>,
    pub resume_position_ms: Option<u64>,
}

// ── Shows & episodes ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub total_episodes: Option<u32>,
    pub explicit: Option<bool>,
    pub media_type: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub duration_ms: Option<u64>,
    pub explicit: Option<bool>,
    pub resume_point: Option<ResumePoint>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub uri: Option<String>,
    /// Parent show; present on saved-episode and single-episode responses.
    pub show: Option<Show>,
}

impl Episode {
    /// Saved-episode listings occasionally contain husks without id or name.
    pub fn is_listable(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }

    pub fn is_fully_played(&self) -> bool {
        self.resume_point
            .as_ref()
            .and_then(|r| r.fully_played)
            .unwrap_or(false)
    }
}

/// Item of `GET /me/shows`.
#[derive(Debug, Deserialize)]
pub struct SavedShow {
    #[allow(dead_code)]
    pub added_at: Option<String>,
    pub show: Show,
}

/// Item of `GET /me/episodes`.
#[derive(Debug, Deserialize)]
pub struct SavedEpisode {
    #[allow(dead_code)]
    pub added_at: Option<String>,
    pub episode: Option<Episode>,
}

/// Minimal body used when probing `GET /audiobooks/{id}`.
#[derive(Debug, Deserialize)]
pub struct AudiobookProbe {
    #[allow(dead_code)]
    pub id: String,
}

// ── Profile ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub product: Option<String>,
    pub country: Option<String>,
}

// ── Search ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Track,
    Artist,
    Album,
    Playlist,
    Show,
    Episode,
    Audiobook,
}

impl SearchKind {
    /// Result sections in display order.
    pub const ALL: &[SearchKind] = &[
        Self::Track,
        Self::Artist,
        Self::Album,
        Self::Playlist,
        Self::Show,
        Self::Episode,
        Self::Audiobook,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Show => "show",
            Self::Episode => "episode",
            Self::Audiobook => "audiobook",
        }
    }
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown search type: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: String,
    pub name: Option<String>,
    /// Filled from the response section the item came from.
    #[serde(rename = "type")]
    pub kind: Option<SearchKind>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub uri: Option<String>,
    pub release_date: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub explicit: Option<bool>,
}

/// Body of `GET /search`. Spotify pads some sections with `null` items.
#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<Page<Option<SearchItem>>>,
    pub artists: Option<Page<Option<SearchItem>>>,
    pub albums: Option<Page<Option<SearchItem>>>,
    pub playlists: Option<Page<Option<SearchItem>>>,
    pub shows: Option<Page<Option<SearchItem>>>,
    pub episodes: Option<Page<Option<SearchItem>>>,
    pub audiobooks: Option<Page<Option<SearchItem>>>,
}

impl SearchResponse {
    /// Flatten all sections in display order, tagging each item with its kind.
    pub fn into_items(self) -> Vec<SearchItem> {
        let sections = [
            (SearchKind::Track, self.tracks),
            (SearchKind::Artist, self.artists),
            (SearchKind::Album, self.albums),
            (SearchKind::Playlist, self.playlists),
            (SearchKind::Show, self.shows),
            (SearchKind::Episode, self.episodes),
            (SearchKind::Audiobook, self.audiobooks),
        ];

        sections
            .into_iter()
            .filter_map(|(kind, page)| page.map(|p| (kind, p.items)))
            .flat_map(|(kind, items)| {
                items.into_iter().flatten().map(move |mut item| {
                    item.kind = Some(kind);
                    item
                })
            })
            .collect()
    }
}
