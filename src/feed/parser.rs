use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link};
use feed_rs::parser;

/// One entry that survived normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub title: String,
    pub description: String,
    /// Always an absolute `http://` or `https://` link.
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Outcome of parsing one feed document.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The document's own title, if it has a non-blank one.
    pub title: Option<String>,
    pub items: Vec<ResolvedItem>,
    /// Entries dropped for an empty or non-absolute link.
    pub skipped: usize,
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty());

    let total = feed.entries.len();
    let items: Vec<ResolvedItem> = feed.entries.into_iter().filter_map(normalize_entry).collect();

    Ok(ParseResult {
        title,
        skipped: total - items.len(),
        items,
    })
}

/// Relative links are dropped: posts are rendered without the feed's base URL.
pub fn is_absolute_http_link(link: &str) -> bool {
    link.starts_with("http://") || link.starts_with("https://")
}

fn normalize_entry(entry: Entry) -> Option<ResolvedItem> {
    let url = primary_link(&entry.links)?.href.trim().to_string();
    if url.is_empty() || !is_absolute_http_link(&url) {
        return None;
    }

    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .unwrap_or_default();

    Some(ResolvedItem {
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        description,
        url,
        published_at: entry.published,
        updated_at: entry.updated,
    })
}

/// The entry's permalink: the first `alternate` (or untyped) link, else the first link.
fn primary_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
}
