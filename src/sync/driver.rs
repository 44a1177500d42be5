use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bridge::types::FeedItem;
use crate::bridge::FeedSource;
use crate::fedi::Destination;
use crate::relay::{MediaRelay, RelayOutcome};
use crate::retry::{self, RetryPolicy};
use crate::sanitize;
use crate::telemetry::{self};
use crate::telemetry::ops::sync::Phase as SyncPhase;
use crate::watermark::WatermarkStore;

use super::types::{PostedItem, PreviewItem, SyncReport};

/// Author prefix the bridge uses for retweets.
const RETWEET_MARKER: &str = "RT";

/// One sync pass: feed -> filter -> sanitize -> relay -> publish -> commit.
pub struct Syncer<'a> {
    pub source: &'a dyn FeedSource,
    pub dest: &'a dyn Destination,
    pub store: &'a WatermarkStore,
    pub relay: &'a MediaRelay,
    pub policy: RetryPolicy,
    pub cancel: CancellationToken,
}

impl Syncer<'_> {
    /// Run once for `handle`. The watermark is written exactly once, at the
    /// end of a live run; an error anywhere leaves the stored value untouched.
    pub async fn run(&self, handle: &str, dry_run: bool) -> Result<SyncReport> {
        let log = telemetry::sync();

        let previous = {
            let _s = log.span(&SyncPhase::LoadWatermark).entered();
            self.store.load()
        };
        log.info(format!("Last synced tweet: {}", previous));

        let items = self
            .source
            .fetch_items(handle)
            .instrument(log.span_kv(&SyncPhase::FetchFeed, [("handle", handle.to_string())]))
            .await
            .with_context(|| format!("fetching feed for {handle}"))?;
        log.debug(format!("fetched {} item(s)", items.len()));

        let report = self.process_items(previous, items, dry_run).await?;

        if !dry_run {
            let _s = log.span(&SyncPhase::Commit).entered();
            self.store
                .store(report.watermark.max(previous))
                .context("committing watermark")?;
        }
        Ok(report)
    }

    /// Walk `items` (newest first, as fetched) oldest to newest. `watermark`
    /// is the accumulator; the advanced value comes back in the report.
    pub async fn process_items(&self, watermark: u64, items: Vec<FeedItem>, dry_run: bool) -> Result<SyncReport> {
        let log = telemetry::sync();
        let mut report = SyncReport { dry_run, previous_watermark: watermark, watermark, ..SyncReport::default() };

        for item in items.into_iter().rev() {
            let span = log.span_kv(&SyncPhase::Item, [("id", item.id.to_string())]);
            self.sync_item(item, dry_run, &mut report).instrument(span).await?;
        }
        Ok(report)
    }

    async fn sync_item(&self, item: FeedItem, dry_run: bool, report: &mut SyncReport) -> Result<()> {
        let log = telemetry::sync();

        if item.id <= report.watermark {
            report.skipped_synced += 1;
            return Ok(());
        }
        if item.author.starts_with(RETWEET_MARKER) {
            log.debug_kv("↩️ skip retweet", [("id", item.id.to_string()), ("author", item.author.clone())]);
            report.skipped_retweet += 1;
            return Ok(());
        }

        let status = {
            let _s = log.span(&SyncPhase::Sanitize).entered();
            match sanitize::clean(&item.content_html) {
                Ok(s) => s,
                Err(e) => {
                    log.warn_kv("⚠️ skip unparseable item", [("id", item.id.to_string()), ("error", e.to_string())]);
                    report.malformed.push(item.id);
                    return Ok(());
                }
            }
        };

        let media = self
            .relay
            .relay(self.source, self.dest, &item.attachments, dry_run, &self.cancel)
            .instrument(log.span(&SyncPhase::Relay))
            .await
            .with_context(|| format!("relaying media for item {}", item.id))?;

        if status.is_empty() && media.is_empty() {
            // Not marked synced; the item is looked at again next run.
            log.debug_kv("↩️ skip empty", [("id", item.id.to_string())]);
            report.skipped_empty += 1;
            return Ok(());
        }

        log.synced_item(item.id, &status, &media.labels(), dry_run);

        match media {
            RelayOutcome::Preview(media) => {
                report.previews.push(PreviewItem { item_id: item.id, status, media });
            }
            RelayOutcome::Uploaded(media_ids) => {
                let status_id = self
                    .publish(&status, &media_ids)
                    .await
                    .with_context(|| format!("publishing item {}", item.id))?;
                report.watermark = item.id;
                report.posted.push(PostedItem { item_id: item.id, status_id, status, media_ids });
            }
        }
        Ok(())
    }

    async fn publish(&self, status: &str, media_ids: &[String]) -> Result<String> {
        let log = telemetry::sync();
        let id = retry::retry(&self.policy, &self.cancel, "status publish", || {
            self.dest.publish_status(status, media_ids)
        })
        .instrument(log.span(&SyncPhase::Publish))
        .await?;
        Ok(id)
    }
}
