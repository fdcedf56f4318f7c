//! Credential and placement collaborators.
//!
//! Authentication and zone discovery live outside this crate; the filesystem
//! only consumes them through these two traits. Production deployments plug
//! in metadata-server or service-account implementations; tests use the
//! `Static*` impls below.

use async_trait::async_trait;

use crate::error::Result;

/// Supplies the bearer token attached to every API request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a currently-valid access token, or an empty string to send
    /// unauthenticated requests.
    async fn token(&self) -> Result<String>;
}

/// Reports the zone the client is running in (e.g. `us-east1-b`).
///
/// Only consulted when the bucket-location allow-list contains `auto`.
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    async fn zone(&self) -> Result<String>;
}

/// A fixed-token provider.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// A provider that sends no credentials.
    pub fn anonymous() -> Self {
        Self::new("")
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// A fixed-zone provider.
#[derive(Debug, Clone)]
pub struct StaticZoneProvider {
    zone: String,
}

impl StaticZoneProvider {
    pub fn new(zone: impl Into<String>) -> Self {
        Self { zone: zone.into() }
    }
}

#[async_trait]
impl ZoneProvider for StaticZoneProvider {
    async fn zone(&self) -> Result<String> {
        Ok(self.zone.clone())
    }
}
