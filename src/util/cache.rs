use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const APP_DIR: &str = "twt2toot";

/// Resolve the per-application cache directory. An explicit override wins;
/// otherwise the platform cache dir (`~/.cache` on Linux) is used, then
/// `$HOME/.cache`.
pub fn resolve_cache_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .context("could not determine a cache directory; pass --cache-dir")?;
    Ok(base.join(APP_DIR))
}

/// Create the cache directory (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating cache dir {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_is_used_verbatim() {
        let got = resolve_cache_dir(Some(Path::new("/tmp/custom"))).unwrap();
        assert_eq!(got, PathBuf::from("/tmp/custom"));
    }

    #[test]
    fn ensure_dir_creates_nested_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // idempotent
        ensure_dir(&nested).unwrap();
    }
}
