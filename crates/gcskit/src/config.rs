//! Filesystem configuration.
//!
//! All knobs live in [`Options`]: cache sizing, timeout triples, the retry
//! budget, the bucket-location allow-list, and the optional extra request
//! header. `Options::from_env()` layers the `GCS_*` environment variables
//! over the defaults, which is how deployments tune the client without code
//! changes.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Default read-cache block size: 128 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;
/// Default read-cache capacity: two blocks.
pub const DEFAULT_MAX_BYTES: u64 = 2 * DEFAULT_BLOCK_SIZE;

/// Operation timeouts, in seconds, grouped by request category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Connection establishment.
    pub connect: u64,
    /// Maximum gap between received bytes.
    pub idle: u64,
    /// Whole-request bound for metadata and listing calls.
    pub metadata: u64,
    /// Whole-request bound for media reads.
    pub read: u64,
    /// Whole-request bound for upload chunks.
    pub write: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: 120,
            idle: 60,
            metadata: 3600,
            read: 3600,
            write: 3600,
        }
    }
}

/// Filesystem options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Read-cache block size in bytes; 0 disables the block cache.
    pub block_size: u64,
    /// Read-cache capacity in bytes; 0 disables the block cache.
    pub max_bytes: u64,
    /// Seconds a cached block may be served regardless of re-validation;
    /// 0 keeps blocks until signature change or eviction.
    pub max_staleness_secs: u64,
    /// Stat cache max age in seconds; 0 disables the stat cache.
    pub stat_cache_max_age_secs: u64,
    /// Stat cache entry cap; 0 means unbounded.
    pub stat_cache_max_entries: usize,
    /// Matching-paths cache max age in seconds; 0 disables it.
    pub matching_paths_cache_max_age_secs: u64,
    /// Matching-paths cache entry cap; 0 means unbounded.
    pub matching_paths_cache_max_entries: usize,
    /// Bucket-location allow-list; empty disables the gate, the single
    /// entry `auto` substitutes the zone-derived region.
    pub allowed_locations: Vec<String>,
    /// Extra header attached to every request.
    pub additional_header: Option<(String, String)>,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
            max_staleness_secs: 0,
            stat_cache_max_age_secs: 0,
            stat_cache_max_entries: 0,
            matching_paths_cache_max_age_secs: 0,
            matching_paths_cache_max_entries: 0,
            allowed_locations: Vec::new(),
            additional_header: None,
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Options {
    /// Defaults overridden by any recognized `GCS_*` environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        // Legacy override first, so the block-size variables below win when
        // both are set.
        if let Some(bytes) = env_u64("GCS_READAHEAD_BUFFER_SIZE_BYTES") {
            options.block_size = bytes;
        }
        if let Some(mb) = env_u64("GCS_READ_CACHE_BLOCK_SIZE_MB") {
            options.block_size = mb * 1024 * 1024;
        }
        if let Some(mb) = env_u64("GCS_READ_CACHE_MAX_SIZE_MB") {
            options.max_bytes = mb * 1024 * 1024;
        }
        if let Some(secs) = env_u64("GCS_READ_CACHE_MAX_STALENESS") {
            options.max_staleness_secs = secs;
        }

        if let Some(secs) = env_u64("GCS_STAT_CACHE_MAX_AGE") {
            options.stat_cache_max_age_secs = secs;
        }
        if let Some(entries) = env_u64("GCS_STAT_CACHE_MAX_ENTRIES") {
            options.stat_cache_max_entries = entries as usize;
        }
        if let Some(secs) = env_u64("GCS_MATCHING_PATHS_CACHE_MAX_AGE") {
            options.matching_paths_cache_max_age_secs = secs;
        }
        if let Some(entries) = env_u64("GCS_MATCHING_PATHS_CACHE_MAX_ENTRIES") {
            options.matching_paths_cache_max_entries = entries as usize;
        }

        if let Some(secs) = env_u64("GCS_REQUEST_CONNECTION_TIMEOUT_SECS") {
            options.timeouts.connect = secs;
        }
        if let Some(secs) = env_u64("GCS_REQUEST_IDLE_TIMEOUT_SECS") {
            options.timeouts.idle = secs;
        }
        if let Some(secs) = env_u64("GCS_METADATA_REQUEST_TIMEOUT_SECS") {
            options.timeouts.metadata = secs;
        }
        if let Some(secs) = env_u64("GCS_READ_REQUEST_TIMEOUT_SECS") {
            options.timeouts.read = secs;
        }
        if let Some(secs) = env_u64("GCS_WRITE_REQUEST_TIMEOUT_SECS") {
            options.timeouts.write = secs;
        }

        if let Ok(raw) = std::env::var("GCS_ALLOWED_BUCKET_LOCATIONS") {
            options.allowed_locations = raw
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        options.additional_header = std::env::var("GCS_ADDITIONAL_REQUEST_HEADER")
            .ok()
            .and_then(|raw| parse_additional_header(&raw));

        options
    }

    /// Whether the block cache is active.
    pub fn block_cache_enabled(&self) -> bool {
        self.block_size > 0 && self.max_bytes > 0
    }

    /// `max_staleness_secs` as a `Duration`, or `None` when disabled.
    pub fn max_staleness(&self) -> Option<Duration> {
        (self.max_staleness_secs > 0).then(|| Duration::from_secs(self.max_staleness_secs))
    }
}

/// Parse `"Name:Value"`; a missing colon or an empty side disqualifies the
/// whole header.
fn parse_additional_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
