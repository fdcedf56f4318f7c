//! Buffered append-only writes with resumable upload.
//!
//! The writer accumulates appends in memory and ships the whole buffer on
//! `flush`/`sync`/`close` through the store's resumable-upload protocol.
//! The upload state machine itself lives on the filesystem core (it is
//! shared with directory-marker creation); this type owns the buffer, the
//! dirty flag, and the invalidation obligations around close.

use std::sync::Weak;

use crate::error::Result;
use crate::fs::FsCore;
use crate::path::ObjectPath;

/// An append-only writable file.
///
/// Like the reader, this is a capability handle holding a weak reference to
/// the filesystem internals. A writer dropped while dirty makes one
/// opportunistic attempt to upload and swallows the outcome; call
/// [`close`](Self::close) to observe upload errors.
#[derive(Debug)]
pub struct ObjectWriter {
    core: Weak<FsCore>,
    path: ObjectPath,
    uri: String,
    buffer: Vec<u8>,
    sync_needed: bool,
    closed: bool,
}

impl ObjectWriter {
    pub(crate) fn new(core: Weak<FsCore>, path: ObjectPath, initial: Vec<u8>) -> Self {
        let uri = path.to_uri();
        Self {
            core,
            path,
            uri,
            buffer: initial,
            // A brand-new writer is dirty: closing it immediately must
            // still create the (possibly empty) object.
            sync_needed: true,
            closed: false,
        }
    }

    /// The URI this writer was opened with.
    pub fn name(&self) -> &str {
        &self.uri
    }

    /// Append bytes to the in-memory buffer.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        self.sync_needed = true;
        Ok(())
    }

    /// The current write position (total buffered length).
    pub fn tell(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Upload the buffer if it has changed since the last upload.
    ///
    /// On success the target's stat-cache entry and cached blocks are
    /// dropped, so subsequent reads observe the new contents.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.sync_needed {
            return Ok(());
        }
        let core = FsCore::upgrade(&self.core)?;
        core.upload_buffer(&self.path, &self.buffer).await?;
        self.sync_needed = false;
        core.invalidate_written(&self.path);
        Ok(())
    }

    /// Same as [`flush`](Self::flush).
    pub async fn sync(&mut self) -> Result<()> {
        self.flush().await
    }

    /// Flush and release the writer.
    ///
    /// Whatever the upload outcome, the target path is invalidated in the
    /// stat and block caches: a failed upload may still have changed the
    /// object, and serving stale data would be worse than refetching.
    pub async fn close(&mut self) -> Result<()> {
        let result = self.flush().await;
        if let Ok(core) = FsCore::upgrade(&self.core) {
            core.invalidate_written(&self.path);
        }
        if result.is_ok() {
            self.closed = true;
        }
        result
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if self.closed || !self.sync_needed {
            return;
        }
        // Last-chance close: retry the upload once in the background and
        // swallow the result. Nothing to observe it by, so failures only
        // show up in the logs.
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(uri = %self.uri, "dirty writer dropped outside a runtime; buffered data lost");
            return;
        };
        let path = self.path.clone();
        let buffer = std::mem::take(&mut self.buffer);
        handle.spawn(async move {
            let uri = path.to_uri();
            if let Err(e) = core.upload_buffer(&path, &buffer).await {
                tracing::warn!(%uri, error = %e, "best-effort upload on drop failed");
            }
            core.invalidate_written(&path);
        });
    }
}
