//! Engine configuration loaded from environment variables.
//!
//! All settings have defaults so the engine runs with zero configuration.
//! The idle/poll/ceiling values are tuning parameters, not protocol
//! constants: the protocol has no "history sync complete" signal, so
//! completion is inferred from a sustained silence window (see
//! [`crate::sync`]).

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory where downloaded media files are stored, named by
    /// plaintext content hash.
    /// Env: `CHATSYNC_MEDIA_DIR`
    /// Default: `<platform data dir>/media`
    pub media_dir: PathBuf,

    /// Silence window after which history draining is considered complete.
    /// Long enough to absorb network jitter between event bursts, short
    /// enough that a normal sync finishes in low single-digit seconds.
    /// Env: `CHATSYNC_IDLE_TIMEOUT_MS`
    /// Default: 275ms
    pub idle_timeout: Duration,

    /// How often the drain loop checks the idle window.
    /// Env: `CHATSYNC_POLL_INTERVAL_MS`
    /// Default: 25ms
    pub poll_interval: Duration,

    /// Wall-clock ceiling that forces sync completion regardless of
    /// ongoing activity (first-time pairing can carry large history).
    /// Env: `CHATSYNC_SYNC_CEILING_SECS`
    /// Default: 30s
    pub sync_ceiling: Duration,

    /// Delay between display-name lookups in the post-sync backfill pass,
    /// to avoid hammering the transport.
    /// Env: `CHATSYNC_NAME_BACKFILL_DELAY_MS`
    /// Default: 100ms
    pub name_backfill_delay: Duration,

    /// Maximum number of display-name lookups per backfill pass.
    /// Default: 50
    pub name_backfill_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            idle_timeout: Duration::from_millis(275),
            poll_interval: Duration::from_millis(25),
            sync_ceiling: Duration::from_secs(30),
            name_backfill_delay: Duration::from_millis(100),
            name_backfill_limit: 50,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            media_dir: std::env::var("CHATSYNC_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_dir),
            idle_timeout: env_millis("CHATSYNC_IDLE_TIMEOUT_MS")
                .unwrap_or(defaults.idle_timeout),
            poll_interval: env_millis("CHATSYNC_POLL_INTERVAL_MS")
                .unwrap_or(defaults.poll_interval),
            sync_ceiling: env_secs("CHATSYNC_SYNC_CEILING_SECS")
                .unwrap_or(defaults.sync_ceiling),
            name_backfill_delay: env_millis("CHATSYNC_NAME_BACKFILL_DELAY_MS")
                .unwrap_or(defaults.name_backfill_delay),
            name_backfill_limit: defaults.name_backfill_limit,
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key).ok()?.parse().ok().map(Duration::from_millis)
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key).ok()?.parse().ok().map(Duration::from_secs)
}

fn default_media_dir() -> PathBuf {
    ProjectDirs::from("com", "chatsync", "chatsync")
        .map(|dirs| dirs.data_dir().join("media"))
        .unwrap_or_else(|| PathBuf::from("./media"))
}
