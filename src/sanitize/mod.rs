//! Turns the `content_html` of a bridge item into plain status text.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::Html;
use thiserror::Error;

// Greedy on purpose: a quoted tweet is nested inside the outer block.
static QUOTE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<blockquote[^>]*>(.*)</blockquote>").expect("valid regex"));
static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<a\s(?:[^>]*?\s)?href="([^"]*)"[^>]*>.*?</a>"#).expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Photo permalinks; the image itself is relayed as an attachment.
const PHOTO_MARKERS: &[&str] = &["pic.twitter.com", "pic.x.com"];
/// Video permalinks. Videos are not relayed.
const VIDEO_MARKER: &str = "/video/";
/// Links to another post (quote or retweet).
const STATUS_MARKER: &str = "status/";

const MAX_DECODE_PASSES: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("content has no <blockquote> body")]
    MissingQuoteBlock,
}

pub fn clean(markup: &str) -> Result<String, SanitizeError> {
    let block = QUOTE_BLOCK
        .captures(markup)
        .and_then(|c| c.get(1))
        .ok_or(SanitizeError::MissingQuoteBlock)?
        .as_str();

    let unlinked = ANCHOR.replace_all(block, |caps: &Captures| rewrite_link(&caps[1]));
    let text = TAG.replace_all(&unlinked, "");

    Ok(decode_entities(&text).trim().to_string())
}

fn rewrite_link(url: &str) -> String {
    if PHOTO_MARKERS.iter().any(|m| url.contains(m)) {
        return String::new();
    }
    if url.contains(VIDEO_MARKER) {
        return String::new();
    }
    if url.contains(STATUS_MARKER) {
        return format!("RT {url}");
    }
    url.to_string()
}

// Bridge output is frequently escaped twice (`&amp;amp;`), so decode until
// the text stops changing. `<` is re-escaped before each pass so text that
// decoded to markup is never parsed as a tag.
fn decode_entities(s: &str) -> String {
    let mut current = s.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        if !current.contains('&') {
            break;
        }
        let escaped = current.replace('<', "&lt;");
        let decoded: String = Html::parse_fragment(&escaped).root_element().text().collect();
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}
