use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use crate::bridge::{RssBridgeClient, DEFAULT_BRIDGE_URL};
use crate::fedi::{FediClientConfig, MastodonClient};
use crate::relay::MediaRelay;
use crate::retry::RetryPolicy;
use crate::telemetry::{self};
use crate::telemetry::emit::Meta;
use crate::util::cache;
use crate::watermark::WatermarkStore;

mod driver;
pub mod types;

pub use driver::Syncer;

const ACCESS_TOKEN_ENV: &str = "TWT2TOOT_ACCESS_TOKEN";

#[derive(Args, Debug)]
pub struct SyncCmd {
    /// Twitter handle to mirror, without the @
    #[arg(short = 't', long)]
    pub twitter_handle: String,
    /// Access token from your Fediverse instance (or TWT2TOOT_ACCESS_TOKEN)
    #[arg(short = 'a', long)]
    pub access_token: Option<String>,
    /// Fediverse instance the account lives on, e.g. https://mastodon.social
    #[arg(short = 'i', long)]
    pub instance: String,
    /// RSS-Bridge instance with the Twitter bridge enabled
    #[arg(short = 'r', long, default_value = DEFAULT_BRIDGE_URL)]
    pub rss_bridge: String,
    /// Preview only: no posting, no uploads, watermark untouched
    #[arg(short = 'd', long, default_value_t = false)]
    pub dry_run: bool,
    /// Where sync.json and downloaded media live
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Give up on an upload/publish after this many attempts (0 = never)
    #[arg(long, default_value_t = 0)]
    pub max_attempts: u32,
    /// Wait before the first retry; the delay doubles after every failed attempt
    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,
    /// Upper bound for the doubling retry delay
    #[arg(long, default_value_t = 60_000)]
    pub max_retry_delay_ms: u64,
    /// Per-request timeout for the bridge, media hosts and the instance
    #[arg(long, default_value_t = 120)]
    pub http_timeout_secs: u64,
}

impl SyncCmd {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let initial_delay = Duration::from_millis(self.retry_delay_ms);
        RetryPolicy {
            initial_delay,
            max_delay: Duration::from_millis(self.max_retry_delay_ms).max(initial_delay),
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
        }
    }
}

pub async fn run(args: SyncCmd, cancel: CancellationToken) -> Result<()> {
    let log = telemetry::sync();
    let root = log.root_span_kv([
        ("handle", args.twitter_handle.clone()),
        ("instance", args.instance.clone()),
        ("bridge", args.rss_bridge.clone()),
        ("dry_run", args.dry_run.to_string()),
    ]);
    run_sync(args, cancel).instrument(root).await
}

async fn run_sync(args: SyncCmd, cancel: CancellationToken) -> Result<()> {
    let log = telemetry::sync();
    let t0 = Instant::now();

    let access_token = args
        .access_token
        .clone()
        .or_else(|| env::var(ACCESS_TOKEN_ENV).ok())
        .with_context(|| format!("Please provide --access-token or set {ACCESS_TOKEN_ENV}"))?;
    if Url::parse(&args.instance).is_err() { bail!("Invalid instance URL: {}", args.instance); }
    if Url::parse(&args.rss_bridge).is_err() { bail!("Invalid RSS-Bridge URL: {}", args.rss_bridge); }

    let cache_dir = cache::resolve_cache_dir(args.cache_dir.as_deref())?;
    cache::ensure_dir(&cache_dir)?;
    log.debug(format!("cache dir {}", cache_dir.display()));

    let policy = args.retry_policy();
    // a stalled feed or media host fails the run instead of hanging it
    let http = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(args.http_timeout())
        .build()?;
    let source = RssBridgeClient::new(http, args.rss_bridge.clone());
    let fedi_cfg = FediClientConfig { timeout: args.http_timeout(), ..FediClientConfig::new(args.instance.clone(), access_token) };
    let dest = MastodonClient::new(fedi_cfg)?;
    let store = WatermarkStore::new(&cache_dir);
    let relay = MediaRelay::new(&cache_dir, policy);

    let syncer = Syncer { source: &source, dest: &dest, store: &store, relay: &relay, policy, cancel: cancel.clone() };

    // Ctrl-C also drops an in-flight request; nothing is committed either way.
    let report = tokio::select! {
        res = syncer.run(&args.twitter_handle, args.dry_run) => res?,
        _ = cancel.cancelled() => bail!("sync cancelled; watermark not committed"),
    };

    log.totals(report.posted.len() + report.previews.len(), report.skipped(), report.malformed.len(), report.watermark);
    if !args.dry_run {
        log.info("All synced");
    }

    if telemetry::config::json_mode() {
        let meta = Some(Meta { duration_ms: Some(t0.elapsed().as_millis()) });
        if args.dry_run { log.plan(&report, meta)?; } else { log.result(&report, meta)?; }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        sync: SyncCmd,
    }

    #[test]
    fn parses_short_flags_with_defaults() {
        let cli = TestCli::try_parse_from(["twt2toot", "-t", "someone", "-a", "tok", "-i", "https://m.example", "-d"]).unwrap();
        assert_eq!(cli.sync.twitter_handle, "someone");
        assert_eq!(cli.sync.access_token.as_deref(), Some("tok"));
        assert_eq!(cli.sync.rss_bridge, DEFAULT_BRIDGE_URL);
        assert!(cli.sync.dry_run);
        assert_eq!(cli.sync.retry_policy(), RetryPolicy::default());
        assert_eq!(cli.sync.http_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn http_timeout_flag_is_honoured_and_never_zero() {
        let cli = TestCli::try_parse_from(["twt2toot", "-t", "x", "-i", "https://m.example", "--http-timeout-secs", "15"]).unwrap();
        assert_eq!(cli.sync.http_timeout(), Duration::from_secs(15));
        let cli = TestCli::try_parse_from(["twt2toot", "-t", "x", "-i", "https://m.example", "--http-timeout-secs", "0"]).unwrap();
        assert_eq!(cli.sync.http_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn help_explains_retry_backoff() {
        use clap::CommandFactory;
        let help = TestCli::command().render_long_help().to_string();
        assert!(help.contains("--retry-delay-ms"));
        assert!(help.contains("doubles after every failed attempt"));
    }

    #[test]
    fn handle_and_instance_are_required() {
        assert!(TestCli::try_parse_from(["twt2toot", "-i", "https://m.example"]).is_err());
        assert!(TestCli::try_parse_from(["twt2toot", "-t", "someone"]).is_err());
    }

    #[test]
    fn retry_flags_build_policy() {
        let cli = TestCli::try_parse_from([
            "twt2toot", "-t", "x", "-i", "https://m.example",
            "--max-attempts", "5", "--retry-delay-ms", "250", "--max-retry-delay-ms", "100",
        ]).unwrap();
        let p = cli.sync.retry_policy();
        assert_eq!(p.max_attempts, Some(5));
        assert_eq!(p.initial_delay, Duration::from_millis(250));
        assert_eq!(p.max_delay, Duration::from_millis(250), "cap is never below the first delay");
    }

    #[tokio::test]
    async fn invalid_instance_is_rejected_before_any_io() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = TestCli::try_parse_from([
            "twt2toot", "-t", "x", "-a", "tok", "-i", "not a url",
            "--cache-dir", tmp.path().to_str().unwrap(),
        ]).unwrap();
        let err = run(cli.sync, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid instance URL"));
        assert!(!tmp.path().join("sync.json").exists());
    }
}
