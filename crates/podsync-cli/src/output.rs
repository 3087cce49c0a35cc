//! Plain-text rendering of shows, episodes and search results.

use chrono::{Local, Months, NaiveDate};

use podsync_api::spotify::types::{SearchItem, Show};
use podsync_core::library::{EpisodeFeed, EpisodeListItem};

/// Which sections of the episode feed to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedFilter {
    pub saved: bool,
    pub recent: bool,
}

impl FeedFilter {
    /// Neither flag means both sections.
    pub fn new(saved_only: bool, subscribed_only: bool) -> Self {
        match (saved_only, subscribed_only) {
            (true, false) => Self {
                saved: true,
                recent: false,
            },
            (false, true) => Self {
                saved: false,
                recent: true,
            },
            _ => Self {
                saved: true,
                recent: true,
            },
        }
    }
}

pub fn print_shows(shows: &[Show], cached: bool) {
    println!("{}", heading("Saved shows", shows.len(), cached));
    for show in shows {
        println!("  {}", show_line(show));
    }
}

pub fn print_feed(feed: &EpisodeFeed, filter: FeedFilter, cached: bool) {
    let today = Local::now().date_naive();
    if filter.saved {
        print_section("Saved episodes", &arrange(&feed.saved_episodes, today), cached);
    }
    if filter.recent {
        print_section(
            "New from your shows",
            &arrange(&feed.recent_episodes, today),
            cached,
        );
    }
}

fn print_section(title: &str, items: &[&EpisodeListItem], cached: bool) {
    println!("{}", heading(title, items.len(), cached));
    for item in items {
        println!("  {}", episode_line(item));
    }
}

/// Drop episodes that are played and released over a month before `today`,
/// then put unfinished ones first, newest first within each group.
///
/// Undated episodes are never dropped and sort after dated ones.
fn arrange(items: &[EpisodeListItem], today: NaiveDate) -> Vec<&EpisodeListItem> {
    let cutoff = today.checked_sub_months(Months::new(1));
    let mut kept: Vec<&EpisodeListItem> = items
        .iter()
        .filter(|item| {
            let old = matches!(
                (release_day(item), cutoff),
                (Some(day), Some(cutoff)) if day < cutoff
            );
            !(item.episode.is_fully_played() && old)
        })
        .collect();

    kept.sort_by(|a, b| {
        a.episode
            .is_fully_played()
            .cmp(&b.episode.is_fully_played())
            .then_with(|| release_day(b).cmp(&release_day(a)))
    });
    kept
}

/// Release date at day, month or year precision, as Spotify reports it.
fn release_day(item: &EpisodeListItem) -> Option<NaiveDate> {
    let raw = item.episode.release_date.as_deref()?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{raw}-01-01"), "%Y-%m-%d"))
        .ok()
}

pub fn print_search(items: &[SearchItem]) {
    if items.is_empty() {
        println!("No results.");
        return;
    }
    for item in items {
        println!("  {}", search_line(item));
    }
}

fn heading(title: &str, count: usize, cached: bool) -> String {
    if cached {
        format!("{title} ({count}, cached)")
    } else {
        format!("{title} ({count})")
    }
}

fn show_line(show: &Show) -> String {
    let mut line = show.name.clone();
    if let Some(publisher) = show.publisher.as_deref().filter(|p| !p.is_empty()) {
        line.push_str(&format!(" by {publisher}"));
    }
    if let Some(url) = &show.external_urls.spotify {
        line.push_str(&format!("  {url}"));
    }
    line
}

fn episode_line(item: &EpisodeListItem) -> String {
    let ep = &item.episode;
    let mut parts = Vec::new();

    if let Some(date) = ep.release_date.as_deref() {
        parts.push(format_release_date(date));
    }
    let mut title = ep.name.clone();
    if let Some(show) = &item.show_name {
        title.push_str(&format!(" ({show})"));
    }
    parts.push(title);
    if let Some(progress) = progress(item) {
        parts.push(progress);
    }
    if item.is_saved {
        parts.push("saved".into());
    }
    parts.join("  ")
}

/// `played`, `12/45 min`, or just the length when the episode is untouched.
fn progress(item: &EpisodeListItem) -> Option<String> {
    let ep = &item.episode;
    if ep.is_fully_played() {
        return Some("played".into());
    }

    let total = ep.duration_ms.map(|ms| ms / 60_000);
    let position = ep
        .resume_point
        .as_ref()
        .and_then(|r| r.resume_position_ms)
        .filter(|ms| *ms > 0)
        .map(|ms| ms / 60_000);

    match (position, total) {
        (Some(pos), Some(total)) => Some(format!("{pos}/{total} min")),
        (None, Some(total)) => Some(format!("{total} min")),
        (Some(pos), None) => Some(format!("at {pos} min")),
        (None, None) => None,
    }
}

fn format_release_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|_| raw.to_owned())
}

fn search_line(item: &SearchItem) -> String {
    let kind = item.kind.map(|k| k.as_str()).unwrap_or("item");
    let name = item.name.as_deref().unwrap_or("(untitled)");
    let mut line = format!("[{kind}] {name}");

    let artists: Vec<&str> = item.artists.iter().map(|a| a.name.as_str()).collect();
    if !artists.is_empty() {
        line.push_str(&format!(" by {}", artists.join(", ")));
    } else if let Some(publisher) = item.publisher.as_deref().filter(|p| !p.is_empty()) {
        line.push_str(&format!(" by {publisher}"));
    }
    if let Some(url) = &item.external_urls.spotify {
        line.push_str(&format!("  {url}"));
    }
    line
}
