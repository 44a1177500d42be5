use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use url::Url;

pub mod types;

use types::{FeedItem, WireFeed, WireId, WireItem};

pub const DEFAULT_BRIDGE_URL: &str = "https://wtf.roflcopter.fr/rss-bridge";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid bridge url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("item has a non-numeric id: {0:?}")]
    BadId(String),
}

/// The tweet side of a sync: the feed itself and the media it links to.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Items for `handle`, newest first as the bridge delivers them.
    async fn fetch_items(&self, handle: &str) -> Result<Vec<FeedItem>, BridgeError>;

    async fn fetch_media(&self, url: &str) -> Result<Bytes, BridgeError>;
}

#[derive(Clone)]
pub struct RssBridgeClient {
    http: Client,
    base_url: String,
}

impl RssBridgeClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    pub fn feed_url(&self, handle: &str) -> Result<Url, BridgeError> {
        let mut url = Url::parse(&format!("{}/", self.base_url.trim_end_matches('/')))?;
        url.query_pairs_mut()
            .append_pair("action", "display")
            .append_pair("bridge", "Twitter")
            .append_pair("context", "By username")
            .append_pair("u", handle)
            .append_pair("norep", "on")
            .append_pair("nopinned", "on")
            .append_pair("format", "Json");
        Ok(url)
    }
}

#[async_trait]
impl FeedSource for RssBridgeClient {
    async fn fetch_items(&self, handle: &str) -> Result<Vec<FeedItem>, BridgeError> {
        let url = self.feed_url(handle)?;
        let bytes = self.http.get(url).send().await?.error_for_status()?.bytes().await?;
        parse_feed(&bytes)
    }

    async fn fetch_media(&self, url: &str) -> Result<Bytes, BridgeError> {
        let bytes = self.http.get(url).send().await?.error_for_status()?.bytes().await?;
        Ok(bytes)
    }
}

pub fn parse_feed(raw: &[u8]) -> Result<Vec<FeedItem>, BridgeError> {
    let feed: WireFeed = serde_json::from_slice(raw)?;
    feed.items.into_iter().map(into_item).collect()
}

fn into_item(w: WireItem) -> Result<FeedItem, BridgeError> {
    let id = match w.rssbridge.id {
        WireId::Num(n) => n,
        WireId::Str(s) => s.trim().parse::<u64>().map_err(|_| BridgeError::BadId(s))?,
    };
    Ok(FeedItem {
        id,
        author: w.author.map(|a| a.name).unwrap_or_default(),
        content_html: w.content_html.unwrap_or_default(),
        attachments: w.attachments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bridge_json() {
        let raw = br#"{
            "version": "https://jsonfeed.org/version/1",
            "items": [
                {
                    "_rssbridge": { "id": "1600000000000000002" },
                    "author": { "name": "alice" },
                    "content_html": "<blockquote>hi</blockquote>",
                    "attachments": [
                        { "mime_type": "image/jpeg", "url": "https://pbs.twimg.com/media/a.jpg?name=orig" }
                    ]
                },
                {
                    "_rssbridge": { "id": 1600000000000000001 },
                    "author": { "name": "RT bob" },
                    "content_html": "<blockquote>rt</blockquote>"
                }
            ]
        }"#;
        let items = parse_feed(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1_600_000_000_000_000_002);
        assert_eq!(items[0].author, "alice");
        assert_eq!(items[0].attachments[0].mime_type, "image/jpeg");
        assert_eq!(items[1].id, 1_600_000_000_000_000_001);
        assert!(items[1].attachments.is_empty());
    }

    #[test]
    fn attachment_without_url_does_not_fail_the_feed() {
        let raw = br#"{"items":[
            {"_rssbridge":{"id":"2"},"author":{"name":"me"},"content_html":"<blockquote>clip</blockquote>",
             "attachments":[{"mime_type":"video/mp4"}]},
            {"_rssbridge":{"id":"1"},"author":{"name":"me"},"content_html":"<blockquote>hi</blockquote>"}
        ]}"#;
        let items = parse_feed(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attachments[0].mime_type, "video/mp4");
        assert_eq!(items[0].attachments[0].url, "");
    }

    #[test]
    fn empty_feed_has_no_items() {
        assert!(parse_feed(b"{}").unwrap().is_empty());
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        let raw = br#"{"items":[{"_rssbridge":{"id":"abc"}}]}"#;
        let err = parse_feed(raw).unwrap_err();
        assert!(matches!(err, BridgeError::BadId(ref s) if s == "abc"));
    }

    #[test]
    fn feed_url_encodes_query() {
        let client = RssBridgeClient::new(Client::new(), "https://bridge.example/rss-bridge/");
        let url = client.feed_url("someone").unwrap();
        assert_eq!(
            url.as_str(),
            "https://bridge.example/rss-bridge/?action=display&bridge=Twitter&context=By+username&u=someone&norep=on&nopinned=on&format=Json"
        );
    }
}
