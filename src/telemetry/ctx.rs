use anyhow::Result;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{info, debug, warn, Span};

use super::emit;

pub trait PhaseSpan {
    fn name(&self) -> &'static str;
    fn span(&self) -> Span;
}

pub trait OpMarker {
    const NAME: &'static str;
    type Phase: PhaseSpan;
    fn root_span() -> Span;
}

/// Typed logging handle for one operation. In JSON log mode every event
/// carries `op` and a flattened `details` string; text mode prints the
/// human message only.
pub struct LogCtx<O: OpMarker> {
    pub(crate) json: bool,
    pub(crate) _marker: PhantomData<O>,
}

impl<O: OpMarker> LogCtx<O> {
    fn op_name(&self) -> &'static str { O::NAME }

    pub fn root_span(&self) -> Span { O::root_span() }

    pub fn root_span_kv<'a, T>(&self, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.root_span();
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), "start");
        } else {
            info!(op = %self.op_name(), details = %details, "start");
        }
        span
    }

    pub fn span(&self, ph: &O::Phase) -> Span { ph.span() }

    pub fn span_kv<'a, T>(&self, ph: &O::Phase, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.span(ph);
        let details = kv_to_string(fields);
        if details.is_empty() {
            debug!(op = %self.op_name(), phase = ph.name(), "span_start");
        } else {
            debug!(op = %self.op_name(), phase = ph.name(), details = %details, "span_start");
        }
        span
    }

    pub fn info(&self, msg: impl AsRef<str>) { if self.json { info!(op = %self.op_name(), "{}", msg.as_ref()); } else { info!("{}", msg.as_ref()); } }
    pub fn debug(&self, msg: impl AsRef<str>) { if self.json { debug!(op = %self.op_name(), "{}", msg.as_ref()); } else { debug!("{}", msg.as_ref()); } }

    pub fn debug_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); debug!(op = %self.op_name(), details = %details, "{}", msg); }
        else { debug!("{}", msg); }
    }

    pub fn warn_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); warn!(op = %self.op_name(), details = %details, "{}", msg); }
        else { warn!("{} ({})", msg, kv_to_string(kv)); }
    }

    pub fn plan<T: Serialize>(&self, plan: &T, meta: Option<emit::Meta>) -> Result<()> { emit::print_plan(self.op_name(), plan, meta) }
    pub fn result<T: Serialize>(&self, result: &T, meta: Option<emit::Meta>) -> Result<()> { emit::print_result(self.op_name(), result, meta) }
}

// Sync-specific helpers
impl LogCtx<crate::telemetry::ops::sync::SyncRun> {
    pub fn synced_item(&self, item_id: u64, status: &str, media: &[String], dry_run: bool) {
        let verb = if dry_run { "would sync" } else { "syncing" };
        if self.json { info!(op = %self.op_name(), item_id, dry_run, media = ?media, status = %status, "sync_item"); }
        else { info!("📤 {} post {}: {:?} media={:?}", verb, item_id, status, media); }
    }

    pub fn totals(&self, posted: usize, skipped: usize, malformed: usize, watermark: u64) {
        if self.json { info!(op = %self.op_name(), posted, skipped, malformed, watermark, "sync_totals"); }
        else { info!("📊 Sync totals — posted={} skipped={} malformed={} watermark={}", posted, skipped, malformed, watermark); }
    }
}

fn kv_to_string<'a, T>(kv: T) -> String
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    let mut parts: Vec<String> = Vec::new();
    for (k, v) in kv { parts.push(format!("{}={}", k, v)); }
    parts.join(" ")
}
