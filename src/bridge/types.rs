use serde::Deserialize;

/// One tweet as delivered by the bridge, after id parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub id: u64,
    pub author: String,
    pub content_html: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub url: String,
}

// JSON Feed wire shape produced by RSS-Bridge with `format=Json`
#[derive(Debug, Deserialize)]
pub(crate) struct WireFeed {
    #[serde(default)]
    pub items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireItem {
    #[serde(rename = "_rssbridge")]
    pub rssbridge: WireBridgeMeta,
    #[serde(default)]
    pub author: Option<WireAuthor>,
    #[serde(default)]
    pub content_html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireBridgeMeta {
    pub id: WireId,
}

// The bridge emits the id as a string; accept a bare number too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Num(u64),
    Str(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAuthor {
    #[serde(default)]
    pub name: String,
}
