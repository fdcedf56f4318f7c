//! Bucket-location policy gate.
//!
//! When an allow-list is configured, every operation that opens an object
//! must first prove the bucket lives in an allowed region. The check is
//! performed before any other network traffic for the operation, and the
//! discovered location is memoized per bucket so repeat opens are free.
//!
//! The single entry `auto` stands for "wherever this client runs": it is
//! substituted with the zone-provider's zone truncated at its last `-`
//! (`us-east1-b` → `us-east1`).

use std::collections::HashSet;
use std::future::Future;

use tokio::sync::OnceCell;

use crate::auth::ZoneProvider;
use crate::cache::TtlCache;
use crate::error::{Error, Result};

type LocationCache = TtlCache<String, String>;

pub struct LocationPolicy {
    allowed: Vec<String>,
    /// Allow-list with `auto` resolved; filled on first use.
    resolved: OnceCell<HashSet<String>>,
    /// Memoized `bucket → location` (lowercased); cleared by `flush`.
    locations: LocationCache,
}

impl LocationPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: allowed.iter().map(|s| s.to_ascii_lowercase()).collect(),
            resolved: OnceCell::new(),
            locations: TtlCache::new(LocationCache::NEVER_EXPIRE, 0),
        }
    }

    /// An empty allow-list turns the gate off entirely.
    pub fn is_enabled(&self) -> bool {
        !self.allowed.is_empty()
    }

    /// Drop the per-bucket memoization.
    pub fn flush(&self) {
        self.locations.clear();
    }

    /// Gate `bucket`, fetching its location with `fetch_location` on the
    /// first encounter.
    pub async fn check<F, Fut>(
        &self,
        bucket: &str,
        zone_provider: &dyn ZoneProvider,
        fetch_location: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if !self.is_enabled() {
            return Ok(());
        }

        let allowed = self
            .resolved
            .get_or_try_init(|| self.resolve_allowed(zone_provider))
            .await?;

        let key = bucket.to_string();
        let location = match self.locations.get(&key) {
            Some(location) => location,
            None => {
                let location = fetch_location().await?.to_ascii_lowercase();
                self.locations.put(key, location.clone());
                location
            }
        };

        if allowed.contains(&location) {
            return Ok(());
        }
        let mut listed: Vec<&str> = allowed.iter().map(String::as_str).collect();
        listed.sort_unstable();
        let message = format!(
            "Bucket '{bucket}' is in '{location}' location, allowed locations are: ({}).",
            listed.join(", ")
        );
        tracing::warn!(bucket, location, "bucket location rejected");
        Err(Error::failed_precondition(message))
    }

    async fn resolve_allowed(&self, zone_provider: &dyn ZoneProvider) -> Result<HashSet<String>> {
        let mut resolved = HashSet::new();
        for entry in &self.allowed {
            if entry == "auto" {
                let zone = zone_provider.zone().await?;
                resolved.insert(region_from_zone(&zone).to_ascii_lowercase());
            } else {
                resolved.insert(entry.clone());
            }
        }
        Ok(resolved)
    }
}

/// `us-east1-b` → `us-east1`; a zone with no `-` is its own region.
fn region_from_zone(zone: &str) -> &str {
    match zone.rfind('-') {
        Some(idx) => &zone[..idx],
        None => zone,
    }
}
