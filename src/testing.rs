//! In-memory `FeedSource` / `Destination` doubles with call logs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::bridge::types::{Attachment, FeedItem};
use crate::bridge::{BridgeError, FeedSource};
use crate::fedi::{Destination, FediError};

pub fn item(id: u64, author: &str, body: &str) -> FeedItem {
    FeedItem {
        id,
        author: author.to_string(),
        content_html: format!("<blockquote>{body}</blockquote>"),
        attachments: Vec::new(),
    }
}

pub fn with_image(mut item: FeedItem, url: &str) -> FeedItem {
    item.attachments.push(Attachment { mime_type: "image/jpeg".to_string(), url: url.to_string() });
    item
}

#[derive(Debug, Default)]
pub struct MockSource {
    items: Mutex<Vec<FeedItem>>,
    media: HashMap<String, Vec<u8>>,
    fail_feed: bool,
    feed_requests: Mutex<Vec<String>>,
    media_requests: Mutex<Vec<String>>,
}

impl MockSource {
    /// `items` newest first, as the bridge returns them.
    pub fn new(items: Vec<FeedItem>) -> Self {
        Self { items: Mutex::new(items), ..Self::default() }
    }

    pub fn with_media(mut self, url: &str, data: &[u8]) -> Self {
        self.media.insert(url.to_string(), data.to_vec());
        self
    }

    pub fn failing_feed(mut self) -> Self {
        self.fail_feed = true;
        self
    }

    pub fn set_items(&self, items: Vec<FeedItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn feed_requests(&self) -> Vec<String> {
        self.feed_requests.lock().unwrap().clone()
    }

    pub fn media_requests(&self) -> Vec<String> {
        self.media_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for MockSource {
    async fn fetch_items(&self, handle: &str) -> Result<Vec<FeedItem>, BridgeError> {
        self.feed_requests.lock().unwrap().push(handle.to_string());
        if self.fail_feed {
            return Err(BridgeError::BadId("feed unavailable".into()));
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn fetch_media(&self, url: &str) -> Result<Bytes, BridgeError> {
        self.media_requests.lock().unwrap().push(url.to_string());
        self.media
            .get(url)
            .map(|b| Bytes::from(b.clone()))
            .ok_or_else(|| BridgeError::BadId(format!("no media at {url}")))
    }
}

#[derive(Debug, Default)]
pub struct MockDestination {
    upload_failures: Mutex<u32>,
    publish_failures: Mutex<u32>,
    upload_attempts: Mutex<u32>,
    publish_attempts: Mutex<u32>,
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    published: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` upload attempts with a 503.
    pub fn failing_uploads(self, n: u32) -> Self {
        *self.upload_failures.lock().unwrap() = n;
        self
    }

    /// Fail the next `n` publish attempts with a 503.
    pub fn failing_publishes(self, n: u32) -> Self {
        *self.publish_failures.lock().unwrap() = n;
        self
    }

    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<String>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn upload_attempts(&self) -> u32 {
        *self.upload_attempts.lock().unwrap()
    }

    pub fn publish_attempts(&self) -> u32 {
        *self.publish_attempts.lock().unwrap()
    }
}

fn unavailable() -> FediError {
    FediError::Api { status: StatusCode::SERVICE_UNAVAILABLE, message: "try later".into() }
}

fn take_failure(slot: &Mutex<u32>) -> bool {
    let mut left = slot.lock().unwrap();
    if *left > 0 {
        *left -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl Destination for MockDestination {
    async fn upload_media(&self, data: Bytes, file_name: &str, mime_type: &str) -> Result<String, FediError> {
        *self.upload_attempts.lock().unwrap() += 1;
        if take_failure(&self.upload_failures) {
            return Err(unavailable());
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((file_name.to_string(), mime_type.to_string(), data.to_vec()));
        Ok(format!("media-{}", uploads.len()))
    }

    async fn publish_status(&self, status: &str, media_ids: &[String]) -> Result<String, FediError> {
        *self.publish_attempts.lock().unwrap() += 1;
        if take_failure(&self.publish_failures) {
            return Err(unavailable());
        }
        let mut published = self.published.lock().unwrap();
        published.push((status.to_string(), media_ids.to_vec()));
        Ok(format!("status-{}", published.len()))
    }
}
