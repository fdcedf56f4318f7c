//! The filesystem facade.
//!
//! [`GcsFileSystem`] projects a hierarchical, POSIX-ish surface onto the
//! store's flat object namespace. Directories are a fiction maintained by
//! convention: a path is a directory if a marker object named `<path>/`
//! exists or if any object lives under the `<path>/` prefix, and the bucket
//! root is a directory whenever the bucket exists.
//!
//! The facade exclusively owns all caches. Mutating operations behave as
//! small transactions: the network effect happens first, and only on
//! success is the union of affected cache entries dropped — with the one
//! exception of writer close, which invalidates its path on every outcome.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use serde::Deserialize;

use crate::auth::{StaticTokenProvider, StaticZoneProvider, TokenProvider, ZoneProvider};
use crate::cache::{BlockCache, Signature, TtlCache};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::glob::{glob_matches, WILDCARDS};
use crate::http::{self, HttpTransport, Request, ReqwestTransport, Response};
use crate::location::LocationPolicy;
use crate::path::ObjectPath;
use crate::reader::{RandomAccessReader, ReadOnlyMemoryRegion};
use crate::request::{ListArgs, RequestBuilder};
use crate::retry;
use crate::writer::ObjectWriter;

/// Buffer size used to slurp an existing object when opening it for append.
const APPEND_READ_CHUNK: usize = 1024 * 1024;

/// Stat information for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Object length in bytes; 0 for directories.
    pub length: u64,
    /// Modification time in nanoseconds since the epoch; 0 when unknown.
    pub mtime_nsec: i64,
    /// Object generation; 0 for directories.
    pub generation: u64,
    pub is_directory: bool,
}

const DIR_STAT: FileStat = FileStat {
    length: 0,
    mtime_nsec: 0,
    generation: 0,
    is_directory: true,
};

impl FileStat {
    fn signature(&self) -> Signature {
        Signature {
            size: self.length,
            mtime_nsec: self.mtime_nsec,
            generation: self.generation,
        }
    }
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
}

#[derive(Deserialize)]
struct RewriteResponse {
    done: bool,
}

/// How far the server got with a resumable upload.
enum UploadStatus {
    Complete,
    /// The server committed bytes `0..n`; resume from `n`.
    CommittedThrough(u64),
}

/// Shared filesystem internals.
///
/// Readers and writers hold `Weak` references to this; the facade holds
/// the only strong one, so dropping the facade ends the handles' ability
/// to operate without tearing caches out from under in-flight calls.
pub(crate) struct FsCore {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenProvider>,
    zones: Arc<dyn ZoneProvider>,
    options: Options,
    location_policy: LocationPolicy,
    block_cache: BlockCache,
    stat_cache: TtlCache<String, FileStat>,
    matching_paths_cache: TtlCache<String, Vec<String>>,
}

impl FsCore {
    pub(crate) fn upgrade(weak: &Weak<FsCore>) -> Result<Arc<FsCore>> {
        weak.upgrade()
            .ok_or_else(|| Error::failed_precondition("the filesystem has been dropped"))
    }

    async fn request_builder(&self) -> Result<RequestBuilder> {
        let token = self.tokens.token().await?;
        Ok(RequestBuilder::new(
            token,
            self.options.additional_header.clone(),
            self.options.timeouts,
        ))
    }

    /// Send a request, retrying transport failures and retriable statuses.
    /// Any other response comes back as `Ok` for the caller to interpret.
    async fn send_with_retries<F>(&self, builder: &RequestBuilder, build: F) -> Result<Response>
    where
        F: Fn(&RequestBuilder) -> Request,
    {
        let build = &build;
        retry::call_with_retries(&self.options.retry, || async move {
            let request = build(builder);
            let uri = request.uri.clone();
            let response = self.transport.send(request).await?;
            if http::is_retriable_status(response.status) {
                return Err(http::status_to_error(response.status, &uri));
            }
            Ok(response)
        })
        .await
    }

    fn block_cache_enabled(&self) -> bool {
        self.options.block_cache_enabled()
    }

    // ---- location gate ----

    async fn ensure_location_allowed(&self, bucket: &str) -> Result<()> {
        self.location_policy
            .check(bucket, self.zones.as_ref(), || self.bucket_location(bucket))
            .await
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String> {
        let builder = self.request_builder().await?;
        let response = self
            .send_with_retries(&builder, |b| b.bucket_metadata(bucket))
            .await?;
        if !response.is_success() {
            return Err(http::status_to_error(
                response.status,
                &format!("gs://{bucket}"),
            ));
        }
        let body: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| Error::internal(format!("invalid bucket metadata for {bucket}: {e}")))?;
        body.get("location")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::internal(format!("bucket metadata for {bucket} carried no location"))
            })
    }

    // ---- metadata ----

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let builder = self.request_builder().await?;
        let response = self
            .send_with_retries(&builder, |b| b.bucket_metadata(bucket))
            .await?;
        match response.status {
            404 => Ok(false),
            _ if response.is_success() => Ok(true),
            s => Err(http::status_to_error(s, &format!("gs://{bucket}"))),
        }
    }

    async fn stat_object_uncached(&self, path: &ObjectPath) -> Result<FileStat> {
        let uri = path.to_uri();
        let builder = self.request_builder().await?;
        let response = self
            .send_with_retries(&builder, |b| b.object_metadata(path))
            .await?;
        if response.status == 404 {
            return Err(Error::not_found(format!("object {uri} does not exist")));
        }
        if !response.is_success() {
            return Err(http::status_to_error(response.status, &uri));
        }

        let body: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| Error::internal(format!("invalid metadata response for {uri}: {e}")))?;
        let length = json_u64(body.get("size"))
            .ok_or_else(|| Error::internal(format!("unexpected metadata response for {uri}")))?;
        let generation = json_u64(body.get("generation")).unwrap_or(0);
        let mtime_nsec = match body.get("updated").and_then(|v| v.as_str()) {
            Some(updated) => parse_rfc3339_nanos(updated)?,
            None => 0,
        };
        Ok(FileStat {
            length,
            mtime_nsec,
            generation,
            is_directory: path.object.ends_with('/'),
        })
    }

    /// Stat through the stat cache. Directory pseudo-stats are cached too;
    /// "not found" is never cached.
    pub(crate) async fn stat_path(&self, path: &ObjectPath) -> Result<FileStat> {
        if path.is_bucket_only() {
            return self.bucket_stat(path).await;
        }
        let key = path.to_uri();
        if let Some(stat) = self.stat_cache.get(&key) {
            return Ok(stat);
        }
        match self.stat_object_uncached(path).await {
            Ok(stat) => {
                self.stat_cache.put(key, stat);
                Ok(stat)
            }
            Err(e) if e.is_not_found() => {
                if self.folder_exists(path).await? {
                    self.stat_cache.put(key, DIR_STAT);
                    Ok(DIR_STAT)
                } else {
                    Err(Error::not_found(format!("the specified path {key} was not found")))
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn bucket_stat(&self, path: &ObjectPath) -> Result<FileStat> {
        if self.bucket_exists(&path.bucket).await? {
            Ok(DIR_STAT)
        } else {
            Err(Error::not_found(format!(
                "the specified bucket {} was not found",
                path.to_uri()
            )))
        }
    }

    /// Whether anything exists under `<path>/`. A positive result is
    /// recorded in the stat cache under the slash-terminated key.
    async fn folder_exists(&self, path: &ObjectPath) -> Result<bool> {
        let dir = path.with_trailing_slash();
        let key = dir.to_uri();
        if let Some(stat) = self.stat_cache.get(&key) {
            return Ok(stat.is_directory);
        }
        let names = self
            .list_object_names(&path.bucket, dir.list_prefix(), false, 1, true)
            .await?;
        if names.is_empty() {
            Ok(false)
        } else {
            self.stat_cache.put(key, DIR_STAT);
            Ok(true)
        }
    }

    pub(crate) async fn is_directory(&self, path: &ObjectPath) -> Result<()> {
        let uri = path.to_uri();
        if path.is_bucket_only() {
            return self.bucket_stat(path).await.map(|_| ());
        }
        if self.folder_exists(path).await? {
            return Ok(());
        }
        // Not a folder; see whether it exists as a plain object. The
        // folder probe above already missed, so don't go through
        // `stat_path` (it would probe again on 404).
        let object_stat = match self.stat_cache.get(&uri) {
            Some(stat) => Ok(stat),
            None => match self.stat_object_uncached(path).await {
                Ok(stat) => {
                    self.stat_cache.put(uri.clone(), stat);
                    Ok(stat)
                }
                Err(e) => Err(e),
            },
        };
        match object_stat {
            Ok(stat) if stat.is_directory => Ok(()),
            Ok(_) => Err(Error::failed_precondition(format!(
                "the specified path {uri} is not a directory"
            ))),
            Err(e) if e.is_not_found() => Err(Error::not_found(format!(
                "the specified path {uri} was not found"
            ))),
            Err(e) => Err(e),
        }
    }

    // ---- listing ----

    /// List object names under `prefix`, relative to it. The self
    /// directory marker (an object named exactly like the prefix) lists as
    /// the empty string when `include_self_marker` is set and is skipped
    /// otherwise. With `delimited`, one level of hierarchy is folded into
    /// `/`-terminated entries.
    pub(crate) async fn list_object_names(
        &self,
        bucket: &str,
        prefix: Option<String>,
        delimited: bool,
        max_results: u64,
        include_self_marker: bool,
    ) -> Result<Vec<String>> {
        let strip = |name: &str| -> Result<String> {
            match &prefix {
                None => Ok(name.to_string()),
                Some(p) => name.strip_prefix(p.as_str()).map(str::to_string).ok_or_else(|| {
                    Error::internal(format!(
                        "unexpected response: entry {name} doesn't match the prefix {p}"
                    ))
                }),
            }
        };

        let builder = self.request_builder().await?;
        let mut names: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let args = ListArgs {
                prefix: prefix.clone(),
                delimited,
                max_results: (max_results != u64::MAX).then_some(max_results),
                page_token: page_token.take(),
            };
            let response = self
                .send_with_retries(&builder, |b| b.list(bucket, &args))
                .await?;
            if !response.is_success() {
                return Err(http::status_to_error(
                    response.status,
                    &format!("gs://{bucket}"),
                ));
            }
            let page: ListResponse = serde_json::from_slice(&response.body).map_err(|e| {
                Error::internal(format!("invalid list response for gs://{bucket}: {e}"))
            })?;

            for item in &page.items {
                let relative = strip(&item.name)?;
                if relative.is_empty() && !include_self_marker {
                    continue;
                }
                names.push(relative);
                if names.len() as u64 >= max_results {
                    return Ok(names);
                }
            }
            if delimited {
                for folder in &page.prefixes {
                    names.push(strip(folder)?);
                    if names.len() as u64 >= max_results {
                        return Ok(names);
                    }
                }
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(names)
    }

    // ---- reads ----

    /// Ranged media read of exactly `[offset, offset + n)`; a short body
    /// means end-of-file. Past-the-end reads come back empty.
    async fn fetch_media(&self, path: &ObjectPath, offset: u64, n: usize) -> Result<Vec<u8>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let uri = path.to_uri();
        let end = offset + n as u64 - 1;
        let builder = self.request_builder().await?;
        let response = self
            .send_with_retries(&builder, |b| b.media(path, offset, end))
            .await?;
        match response.status {
            416 => Ok(Vec::new()),
            404 => Err(Error::not_found(format!("object {uri} does not exist"))),
            _ if response.is_success() => Ok(response.body),
            s => Err(http::status_to_error(s, &uri)),
        }
    }

    pub(crate) async fn read_object(
        &self,
        path: &ObjectPath,
        offset: u64,
        n: usize,
    ) -> Result<Vec<u8>> {
        let uri = path.to_uri();
        if self.block_cache_enabled() {
            // Every read re-validates the signature; a stale stat cache
            // bounds how long an overwrite can stay invisible, and a
            // disabled one makes each read see the newest generation.
            let stat = self.stat_path(path).await?;
            return self
                .block_cache
                .read(&uri, stat.signature(), offset, n, |block_offset, len| {
                    self.fetch_media(path, block_offset, len)
                })
                .await;
        }

        let bytes = self.fetch_media(path, offset, n).await?;
        if bytes.len() < n {
            if let Some(stat) = self.stat_cache.get(&uri) {
                if offset + (bytes.len() as u64) < stat.length {
                    return Err(Error::internal(format!(
                        "file contents are inconsistent for file: {uri}"
                    )));
                }
            }
            return Err(Error::out_of_range(
                format!("EOF reached reading {n} bytes at offset {offset} of {uri}"),
                bytes,
            ));
        }
        Ok(bytes)
    }

    // ---- writes ----

    /// Drop the cache entries a completed (or attempted) write could have
    /// made stale.
    pub(crate) fn invalidate_written(&self, path: &ObjectPath) {
        let uri = path.to_uri();
        tracing::debug!(%uri, "invalidating caches after write");
        self.stat_cache.erase(&uri);
        self.block_cache.invalidate(&uri);
    }

    async fn create_upload_session(
        &self,
        builder: &RequestBuilder,
        path: &ObjectPath,
        total: u64,
    ) -> Result<String> {
        let uri = path.to_uri();
        let response = self.transport.send(builder.upload_init(path, total)).await?;
        if !response.is_success() {
            return Err(http::status_to_error(response.status, &uri));
        }
        response
            .header("Location")
            .map(str::to_string)
            .ok_or_else(|| {
                Error::internal(format!("upload session response for {uri} carried no Location"))
            })
    }

    async fn probe_upload_status(
        &self,
        builder: &RequestBuilder,
        session_uri: &str,
        total: u64,
        uri: &str,
    ) -> Result<UploadStatus> {
        let response = self
            .transport
            .send(builder.upload_status_probe(session_uri, total))
            .await?;
        match response.status {
            s if (200..300).contains(&s) => Ok(UploadStatus::Complete),
            308 => match response.header("Range") {
                Some(range) => {
                    let committed = parse_range_end(range).ok_or_else(|| {
                        Error::internal(format!("unexpected Range header '{range}' for {uri}"))
                    })?;
                    Ok(UploadStatus::CommittedThrough(committed + 1))
                }
                None => Ok(UploadStatus::CommittedThrough(0)),
            },
            s => Err(upload_error(s, uri)),
        }
    }

    async fn put_upload_chunk(
        &self,
        builder: &RequestBuilder,
        session_uri: &str,
        data: &[u8],
        uploaded: u64,
        total: u64,
        uri: &str,
    ) -> Result<()> {
        let body = data[uploaded as usize..].to_vec();
        let response = self
            .transport
            .send(builder.upload_chunk(session_uri, body, uploaded, total))
            .await?;
        match response.status {
            s if (200..300).contains(&s) => Ok(()),
            // The server acknowledged a prefix but wants the rest; probe
            // for the committed length and resume.
            308 => Err(Error::unavailable(format!(
                "important HTTP error 308 when uploading {uri}"
            ))),
            s => Err(upload_error(s, uri)),
        }
    }

    /// One logical upload attempt: probe for server-side progress (on
    /// every attempt after the first), then PUT the remaining bytes. A
    /// probe that reports the upload complete short-circuits the PUT.
    async fn upload_attempt(
        &self,
        builder: &RequestBuilder,
        session_uri: &str,
        data: &[u8],
        total: u64,
        uri: &str,
        probe_first: bool,
        uploaded: &mut u64,
    ) -> Result<()> {
        if probe_first {
            match self
                .probe_upload_status(builder, session_uri, total, uri)
                .await?
            {
                UploadStatus::Complete => return Ok(()),
                UploadStatus::CommittedThrough(n) => *uploaded = n.min(total),
            }
        }
        self.put_upload_chunk(builder, session_uri, data, *uploaded, total, uri)
            .await
    }

    /// Upload `data` as the full new contents of `path` via the resumable
    /// protocol, probing for server-side progress between attempts.
    ///
    /// Attempt accounting: a status probe and the PUT it precedes form one
    /// logical attempt, so a failed attempt — wherever in the cycle it
    /// failed — consumes exactly one unit of the retry budget. A
    /// not-found-shaped failure (HTTP 410: the session died) aborts this
    /// flush and surfaces as a retriable `Unavailable` so the caller may
    /// re-close with a fresh session.
    pub(crate) async fn upload_buffer(&self, path: &ObjectPath, data: &[u8]) -> Result<()> {
        let uri = path.to_uri();
        let total = data.len() as u64;
        let config = self.options.retry;
        let builder = self.request_builder().await?;
        let session_uri = self.create_upload_session(&builder, path, total).await?;

        let mut first_attempt = true;
        let mut uploaded: u64 = 0;
        let mut failures = 0u32;
        let mut delay = config.init_delay;

        let outcome = loop {
            let probe_first = !first_attempt;
            first_attempt = false;
            match self
                .upload_attempt(
                    &builder,
                    &session_uri,
                    data,
                    total,
                    &uri,
                    probe_first,
                    &mut uploaded,
                )
                .await
            {
                Ok(()) => break Ok(()),
                Err(e) if e.is_retriable() => {
                    failures += 1;
                    if failures > config.max_retries {
                        break Err(config.exhausted(&e));
                    }
                    tracing::debug!(%uri, attempt = failures, error = %e, "upload attempt failed");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    delay = (delay * 2).min(config.max_delay);
                }
                Err(e) => break Err(e),
            }
        };

        match outcome {
            Err(e) if e.is_not_found() => Err(Error::unavailable(format!(
                "Upload to {uri} failed, caused by: {e}"
            ))),
            other => other,
        }
    }

    // ---- deletion & rename ----

    async fn delete_object_raw(&self, path: &ObjectPath) -> Result<()> {
        let uri = path.to_uri();
        let builder = self.request_builder().await?;
        let response = self.transport.send(builder.delete(path)).await?;
        match response.status {
            404 => Err(Error::not_found(format!("object {uri} does not exist"))),
            _ if response.is_success() => Ok(()),
            s => Err(http::status_to_error(s, &uri)),
        }
    }

    /// Server-side rewrite then source deletion, with the union of both
    /// endpoints' cache entries dropped on success.
    async fn rename_object(&self, src: &ObjectPath, dst: &ObjectPath) -> Result<()> {
        let builder = self.request_builder().await?;
        let response = self.transport.send(builder.rewrite(src, dst)).await?;
        if !response.is_success() {
            return Err(http::status_to_error(response.status, &src.to_uri()));
        }
        let rewrite: RewriteResponse = serde_json::from_slice(&response.body).map_err(|e| {
            Error::internal(format!("invalid rewrite response for {src}: {e}"))
        })?;
        if !rewrite.done {
            // The server wants a multi-shot rewrite (large object crossing
            // storage locations); this client only speaks the one-shot form.
            return Err(Error::unimplemented(format!(
                "couldn't rename {src} to {dst}: multi-shot rewrites are not supported"
            )));
        }

        retry::delete_with_retries(&self.options.retry, || self.delete_object_raw(src)).await?;

        self.invalidate_written(src);
        self.invalidate_written(dst);
        Ok(())
    }

    pub(crate) async fn rename(&self, src: &ObjectPath, dst: &ObjectPath) -> Result<()> {
        if self.is_directory(src).await.is_ok() {
            let src_dir = src.with_trailing_slash();
            let dst_dir = dst.with_trailing_slash();
            let children = self
                .list_object_names(&src.bucket, src_dir.list_prefix(), false, u64::MAX, true)
                .await?;
            for relative in children {
                self.rename_object(&src_dir.child(&relative), &dst_dir.child(&relative))
                    .await?;
            }
            Ok(())
        } else {
            self.rename_object(src, dst).await
        }
    }

    fn flush_caches(&self) {
        tracing::debug!("flushing all caches");
        self.block_cache.clear();
        self.stat_cache.clear();
        self.matching_paths_cache.clear();
        self.location_policy.flush();
    }
}

fn json_u64(value: Option<&serde_json::Value>) -> Option<u64> {
    match value? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn parse_rfc3339_nanos(timestamp: &str) -> Result<i64> {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| Error::internal(format!("invalid timestamp '{timestamp}': {e}")))?
        .timestamp_nanos_opt()
        .ok_or_else(|| Error::internal(format!("timestamp '{timestamp}' out of range")))
}

/// Parse the end byte out of `bytes=0-10` or `0-10`.
fn parse_range_end(range: &str) -> Option<u64> {
    let range = range.strip_prefix("bytes=").unwrap_or(range);
    let (_, end) = range.split_once('-')?;
    end.trim().parse().ok()
}

/// Upload-specific status mapping; the message names the upload target so
/// wrapped causes stay attributable.
fn upload_error(status: u16, uri: &str) -> Error {
    let msg = format!("important HTTP error {status} when uploading {uri}");
    match status {
        404 | 410 => Error::not_found(msg),
        s if http::is_retriable_status(s) => Error::unavailable(msg),
        400 => Error::invalid_argument(msg),
        401 | 403 => Error::failed_precondition(msg),
        _ => Error::internal(msg),
    }
}

/// Builder for a customized [`GcsFileSystem`].
#[derive(Default)]
pub struct GcsFileSystemBuilder {
    transport: Option<Arc<dyn HttpTransport>>,
    tokens: Option<Arc<dyn TokenProvider>>,
    zones: Option<Arc<dyn ZoneProvider>>,
    options: Option<Options>,
}

impl GcsFileSystemBuilder {
    /// Use a custom transport (tests substitute a scripted fake here).
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn zone_provider(mut self, zones: Arc<dyn ZoneProvider>) -> Self {
        self.zones = Some(zones);
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> GcsFileSystem {
        let options = self.options.unwrap_or_default();
        let core = FsCore {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            tokens: self
                .tokens
                .unwrap_or_else(|| Arc::new(StaticTokenProvider::anonymous())),
            zones: self
                .zones
                .unwrap_or_else(|| Arc::new(StaticZoneProvider::new(""))),
            location_policy: LocationPolicy::new(options.allowed_locations.clone()),
            block_cache: BlockCache::new(
                options.block_size.max(1),
                options.max_bytes,
                options.max_staleness(),
            ),
            stat_cache: TtlCache::new(
                options.stat_cache_max_age_secs,
                options.stat_cache_max_entries,
            ),
            matching_paths_cache: TtlCache::new(
                options.matching_paths_cache_max_age_secs,
                options.matching_paths_cache_max_entries,
            ),
            options,
        };
        GcsFileSystem {
            core: Arc::new(core),
        }
    }
}

/// A client-side filesystem over a bucket-oriented object store.
#[derive(Clone)]
pub struct GcsFileSystem {
    core: Arc<FsCore>,
}

impl Default for GcsFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl GcsFileSystem {
    /// A filesystem with the production transport and configuration drawn
    /// from the `GCS_*` environment variables.
    pub fn new() -> Self {
        Self::builder().options(Options::from_env()).build()
    }

    pub fn builder() -> GcsFileSystemBuilder {
        GcsFileSystemBuilder::default()
    }

    fn handle(&self) -> Weak<FsCore> {
        Arc::downgrade(&self.core)
    }

    /// Open `uri` for random-access reads.
    ///
    /// With the block cache enabled, reads go through cached blocks keyed
    /// by the file's current signature; otherwise each read is a direct
    /// ranged request.
    pub async fn new_random_access_file(&self, uri: &str) -> Result<RandomAccessReader> {
        let path = ObjectPath::parse(uri, true)?;
        self.core.ensure_location_allowed(&path.bucket).await?;
        Ok(RandomAccessReader::new(self.handle(), path))
    }

    /// Open `uri` for writing; the object is replaced on close.
    pub async fn new_writable_file(&self, uri: &str) -> Result<ObjectWriter> {
        let path = ObjectPath::parse(uri, true)?;
        self.core.ensure_location_allowed(&path.bucket).await?;
        Ok(ObjectWriter::new(self.handle(), path, Vec::new()))
    }

    /// Open `uri` for appending: the current contents are read into the
    /// writer's buffer and re-uploaded with whatever gets appended.
    pub async fn new_appendable_file(&self, uri: &str) -> Result<ObjectWriter> {
        let path = ObjectPath::parse(uri, true)?;
        self.core.ensure_location_allowed(&path.bucket).await?;

        let mut existing = Vec::new();
        loop {
            match self
                .core
                .read_object(&path, existing.len() as u64, APPEND_READ_CHUNK)
                .await
            {
                Ok(bytes) => existing.extend_from_slice(&bytes),
                Err(Error::OutOfRange { partial, .. }) => {
                    existing.extend_from_slice(&partial);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ObjectWriter::new(self.handle(), path, existing))
    }

    /// Load the whole object into an immutable memory region.
    pub async fn new_read_only_memory_region(&self, uri: &str) -> Result<ReadOnlyMemoryRegion> {
        let path = ObjectPath::parse(uri, true)?;
        self.core.ensure_location_allowed(&path.bucket).await?;
        let stat = self.core.stat_path(&path).await?;
        let data = self
            .core
            .fetch_media(&path, 0, stat.length as usize)
            .await?;
        Ok(ReadOnlyMemoryRegion::new(data))
    }

    /// Whether `uri` exists as an object, a directory, or a bucket.
    pub async fn file_exists(&self, uri: &str) -> Result<()> {
        let path = ObjectPath::parse(uri, false)?;
        self.core.stat_path(&path).await.map(|_| ())
    }

    /// Names of the direct children of a directory. Subdirectories keep a
    /// trailing `/`; the directory's own marker is filtered out.
    pub async fn get_children(&self, uri: &str) -> Result<Vec<String>> {
        let path = ObjectPath::parse(uri, false)?;
        self.core
            .list_object_names(&path.bucket, path.list_prefix(), true, u64::MAX, false)
            .await
    }

    /// Expand a wildcard pattern against the store.
    ///
    /// The result vector is memoized under the literal pattern string and
    /// only flushed by [`flush_caches`](Self::flush_caches).
    pub async fn get_matching_paths(&self, pattern: &str) -> Result<Vec<String>> {
        if let Some(cached) = self.core.matching_paths_cache.get(&pattern.to_string()) {
            return Ok(cached);
        }
        let result = self.compute_matching_paths(pattern).await?;
        self.core
            .matching_paths_cache
            .put(pattern.to_string(), result.clone());
        Ok(result)
    }

    async fn compute_matching_paths(&self, pattern: &str) -> Result<Vec<String>> {
        let wildcard = pattern.find(&WILDCARDS[..]);
        let Some(idx) = wildcard else {
            // No wildcard: the pattern is a literal path.
            return match self.file_exists(pattern).await {
                Ok(()) => Ok(vec![pattern.to_string()]),
                Err(e) if e.is_not_found() => Ok(Vec::new()),
                Err(e) => Err(e),
            };
        };

        let fixed_prefix = &pattern[..idx];
        let dir = match fixed_prefix.rfind('/') {
            Some(slash) => &fixed_prefix[..slash],
            None => "",
        };
        let dir_path = ObjectPath::parse(dir, false).map_err(|_| {
            Error::invalid_argument(format!("pattern doesn't contain a bucket name: {pattern}"))
        })?;

        let names = self
            .core
            .list_object_names(
                &dir_path.bucket,
                dir_path.list_prefix(),
                false,
                u64::MAX,
                false,
            )
            .await?;

        // Every object plus each of its ancestor "directories" is a match
        // candidate; self markers are already filtered by the listing.
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for name in &names {
            let trimmed = name.trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            for (i, c) in trimmed.char_indices() {
                if c == '/' {
                    candidates.insert(trimmed[..i].to_string());
                }
            }
            candidates.insert(trimmed.to_string());
        }

        Ok(candidates
            .into_iter()
            .map(|candidate| dir_path.child(&candidate).to_uri())
            .filter(|full| glob_matches(full, pattern))
            .collect())
    }

    /// Stat a path; directories (markers, implied prefixes, buckets) stat
    /// as zero-length directory entries.
    pub async fn stat(&self, uri: &str) -> Result<FileStat> {
        let path = ObjectPath::parse(uri, false)?;
        self.core.stat_path(&path).await
    }

    /// Delete one object; its stat-cache entry and cached blocks go with it.
    pub async fn delete_file(&self, uri: &str) -> Result<()> {
        let path = ObjectPath::parse(uri, true)?;
        self.core.delete_object_raw(&path).await?;
        self.core.invalidate_written(&path);
        Ok(())
    }

    /// Create a directory by uploading a zero-length `<dir>/` marker.
    pub async fn create_dir(&self, uri: &str) -> Result<()> {
        let path = ObjectPath::parse(uri, false)?;
        if path.is_bucket_only() {
            return self.core.bucket_stat(&path).await.map(|_| ());
        }
        let marker = path.with_trailing_slash();
        if self.core.stat_path(&marker).await.is_ok() {
            return Err(Error::already_exists(marker.to_uri()));
        }
        self.core.upload_buffer(&marker, &[]).await?;
        self.core.invalidate_written(&marker);
        Ok(())
    }

    /// Delete an empty directory. A directory holding anything beyond its
    /// own marker is refused.
    pub async fn delete_dir(&self, uri: &str) -> Result<()> {
        let path = ObjectPath::parse(uri, false)?;
        let names = self
            .core
            .list_object_names(&path.bucket, path.list_prefix(), false, 2, true)
            .await?;
        if names.iter().any(|n| !n.is_empty()) {
            return Err(Error::failed_precondition(
                "cannot delete a non-empty directory",
            ));
        }
        if names.len() == 1 {
            // Only the directory marker is left; remove it.
            let marker = path.with_trailing_slash();
            self.core.delete_object_raw(&marker).await?;
            self.core.invalidate_written(&marker);
        }
        Ok(())
    }

    /// Best-effort recursive deletion. Returns `(undeleted_files,
    /// undeleted_dirs)`; a missing source directory is `NotFound` (with
    /// nothing deleted, the directory itself being the one undeleted
    /// entry).
    pub async fn delete_recursively(&self, uri: &str) -> Result<(u64, u64)> {
        let path = ObjectPath::parse(uri, false)?;
        self.core.is_directory(&path).await.map_err(|e| {
            if e.is_not_found() {
                Error::not_found(format!("the specified path {uri} was not found"))
            } else {
                e
            }
        })?;

        let dir = path.with_trailing_slash();
        let children = self
            .core
            .list_object_names(&path.bucket, dir.list_prefix(), false, u64::MAX, true)
            .await?;

        let mut undeleted_files = 0u64;
        let mut undeleted_dirs = 0u64;
        for relative in children {
            let child = dir.child(&relative);
            let deleted = retry::delete_with_retries(&self.core.options.retry, || {
                self.core.delete_object_raw(&child)
            })
            .await;
            if deleted.is_ok() {
                self.core.invalidate_written(&child);
            }
            if let Err(e) = deleted {
                tracing::debug!(child = %child.to_uri(), error = %e, "recursive delete left an entry behind");
                // The entry may be a directory whose marker was already
                // gone; classify so the caller knows what survived.
                if self.core.is_directory(&child).await.is_ok() {
                    undeleted_dirs += 1;
                } else {
                    undeleted_files += 1;
                }
            }
        }
        Ok((undeleted_files, undeleted_dirs))
    }

    /// Rename an object or a directory tree via server-side rewrites.
    pub async fn rename_file(&self, src_uri: &str, dst_uri: &str) -> Result<()> {
        let src = ObjectPath::parse(src_uri, true)?;
        let dst = ObjectPath::parse(dst_uri, true)?;
        self.core.rename(&src, &dst).await
    }

    /// Size of an object in bytes.
    pub async fn get_file_size(&self, uri: &str) -> Result<u64> {
        let path = ObjectPath::parse(uri, true)?;
        Ok(self.core.stat_path(&path).await?.length)
    }

    /// Succeeds iff `uri` is a directory (bucket, marker, or non-empty
    /// prefix). A plain object fails with `FailedPrecondition`; an absent
    /// path with `NotFound`.
    pub async fn is_directory(&self, uri: &str) -> Result<()> {
        let path = ObjectPath::parse(uri, false)?;
        self.core.is_directory(&path).await
    }

    /// Empty every cache: blocks, stats, matching paths, and the
    /// bucket-location memoization. The next operation of any kind goes
    /// back to the origin.
    pub fn flush_caches(&self) {
        self.core.flush_caches();
    }
}
