use serde::Serialize;

use crate::relay::CachedMedia;

/// A tweet that was published this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedItem {
    pub item_id: u64,
    pub status_id: String,
    pub status: String,
    pub media_ids: Vec<String>,
}

/// A tweet that a dry run would have published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewItem {
    pub item_id: u64,
    pub status: String,
    pub media: Vec<CachedMedia>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub previous_watermark: u64,
    /// Watermark after the run; equals `previous_watermark` for dry runs.
    pub watermark: u64,
    pub posted: Vec<PostedItem>,
    pub previews: Vec<PreviewItem>,
    pub skipped_synced: usize,
    pub skipped_retweet: usize,
    pub skipped_empty: usize,
    /// Ids of items whose content had no quotation block.
    pub malformed: Vec<u64>,
}

impl SyncReport {
    pub fn skipped(&self) -> usize {
        self.skipped_synced + self.skipped_retweet + self.skipped_empty
    }
}
