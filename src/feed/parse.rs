use std::borrow::Cow;
use std::sync::LazyLock;

use feed_rs::model::Entry;
use feed_rs::parser;
use regex::bytes::Regex;

use crate::models::{FeedItem, FetchError};

const UNTITLED: &str = "No Title";
const NO_SUMMARY: &str = "No summary available.";

/// A parsed feed document: declared title and its identifiable entries.
#[derive(Debug)]
pub struct ParsedFeed {
    pub title: String,
    pub items: Vec<FeedItem>,
}

static BROKEN_BR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</\s*br\s*>").expect("closing br regex"));

/// Some feeds close line breaks with `</br>`, which strict parsers reject.
/// Works on raw bytes so the document's declared encoding survives.
pub fn fix_malformed_markup(content: &[u8]) -> Cow<'_, [u8]> {
    BROKEN_BR.replace_all(content, &b"<br/>"[..])
}

/// Parse a feed body. The title falls back to `url` when the feed declares none.
pub fn parse_feed(url: &str, body: &[u8]) -> Result<ParsedFeed, FetchError> {
    let content = fix_malformed_markup(body);
    // Entries without an id are identified by their link, not a synthesized hash
    let feed = parser::Builder::new()
        .id_generator(|links, _title, _uri| {
            links.first().map(|l| l.href.clone()).unwrap_or_default()
        })
        .build()
        .parse(&*content)?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let raw_title = entry.title.as_ref().map(|t| t.content.clone());
            let item = normalize_entry(entry);
            if item.is_none() {
                tracing::warn!(
                    feed = url,
                    title = raw_title.as_deref().unwrap_or(UNTITLED),
                    "Skipping item with no GUID or link"
                );
            }
            item
        })
        .collect();

    Ok(ParsedFeed { title, items })
}

/// Normalize an entry, or `None` when it has neither a GUID nor a link.
pub fn normalize_entry(entry: Entry) -> Option<FeedItem> {
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();

    let guid = if entry.id.trim().is_empty() {
        link.clone()
    } else {
        entry.id.trim().to_string()
    };

    if guid.is_empty() {
        return None;
    }

    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    // Description first, then full content
    let summary = entry
        .summary
        .map(|s| s.content)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.and_then(|c| c.body))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NO_SUMMARY.to_string());

    Some(FeedItem {
        title,
        link,
        guid,
        published: entry.published.or(entry.updated),
        summary,
    })
}
