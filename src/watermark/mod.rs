use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::util::cache;

const SYNC_FILE: &str = "sync.json";

/// On-disk record: `{ "synced_until": <id> }`.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncState {
    #[serde(default)]
    pub synced_until: u64,
}

/// Persists the id of the newest feed item known to be fully synced.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    dir: PathBuf,
}

impl WatermarkStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { dir: cache_dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SYNC_FILE)
    }

    /// Last committed watermark. Missing, unreadable or corrupt state reads
    /// as 0; the cost is a one-time re-sync of items still in the feed.
    pub fn load(&self) -> u64 {
        read_state(&self.path())
            .map(|s| s.synced_until)
            .unwrap_or(0)
    }

    /// Overwrite the stored watermark. The value is written to a temp file in
    /// the same directory and renamed into place, so readers never observe a
    /// partial record.
    pub fn store(&self, watermark: u64) -> Result<()> {
        cache::ensure_dir(&self.dir)?;
        let state = SyncState { synced_until: watermark };
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        let path = self.path();
        tmp.persist(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn read_state(path: &Path) -> Option<SyncState> {
    let raw = std::fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}
