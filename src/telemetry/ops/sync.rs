use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct SyncRun;

#[derive(Copy, Clone, Debug)]
pub enum Phase { LoadWatermark, FetchFeed, Item, Sanitize, Relay, Publish, Commit }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::LoadWatermark => "load_watermark",
        Phase::FetchFeed => "fetch_feed",
        Phase::Item => "item",
        Phase::Sanitize => "sanitize",
        Phase::Relay => "relay",
        Phase::Publish => "publish",
        Phase::Commit => "commit",
    }}
    fn span(&self) -> Span { match self {
        Phase::LoadWatermark => info_span!("load_watermark"),
        Phase::FetchFeed => info_span!("fetch_feed"),
        Phase::Item => info_span!("item"),
        Phase::Sanitize => info_span!("sanitize"),
        Phase::Relay => info_span!("relay"),
        Phase::Publish => info_span!("publish"),
        Phase::Commit => info_span!("commit"),
    }}
}

impl OpMarker for SyncRun {
    const NAME: &'static str = "sync";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("sync") }
}
