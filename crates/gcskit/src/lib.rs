//! gcskit - a client-side filesystem over a bucket-oriented object store
//!
//! Exposes a hierarchical, POSIX-like surface (random-access reads,
//! append-only writes, stat, list, rename, recursive delete) on top of a
//! flat, immutable-object namespace accessed through an authenticated
//! JSON/REST API, and keeps it fast with a signature-invalidated block
//! cache, TTL stat and matching-paths caches, resumable uploads, and
//! bounded retry loops.
//!
//! # Example
//!
//! ```rust,no_run
//! use gcskit::GcsFileSystem;
//!
//! #[tokio::main]
//! async fn main() -> gcskit::Result<()> {
//!     let fs = GcsFileSystem::new();
//!     let file = fs.new_random_access_file("gs://bucket/data.bin").await?;
//!     let header = file.read_at(0, 16).await?;
//!     assert_eq!(header.len(), 16);
//!     Ok(())
//! }
//! ```

mod auth;
mod cache;
mod config;
mod error;
mod fs;
mod glob;
mod http;
mod location;
mod path;
mod reader;
mod request;
mod retry;
mod writer;

pub use auth::{StaticTokenProvider, StaticZoneProvider, TokenProvider, ZoneProvider};
pub use config::{Options, TimeoutConfig, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_BYTES};
pub use error::{Error, Result};
pub use fs::{FileStat, GcsFileSystem, GcsFileSystemBuilder};
pub use http::{HttpTransport, Method, ReqwestTransport, Request, RequestTimeouts, Response};
pub use reader::{RandomAccessReader, ReadOnlyMemoryRegion};
pub use retry::RetryConfig;
pub use writer::ObjectWriter;

// Re-exported so custom transports and providers can be written against
// the same macro this crate uses.
pub use async_trait::async_trait;
