//! Random-access file reads.

use std::sync::Weak;

use crate::error::Result;
use crate::fs::FsCore;
use crate::path::ObjectPath;

/// A random-access view of one object.
///
/// The reader is a capability handle: it holds the target path and a weak
/// reference to the filesystem internals, and re-enters the filesystem's
/// caches on every read. Dropping the filesystem invalidates the handle;
/// dropping the handle never touches the caches.
#[derive(Debug)]
pub struct RandomAccessReader {
    core: Weak<FsCore>,
    path: ObjectPath,
    uri: String,
}

impl RandomAccessReader {
    pub(crate) fn new(core: Weak<FsCore>, path: ObjectPath) -> Self {
        let uri = path.to_uri();
        Self { core, path, uri }
    }

    /// The URI this reader was opened with.
    pub fn name(&self) -> &str {
        &self.uri
    }

    /// Read up to `n` bytes at `offset`.
    ///
    /// A full read returns `Ok`; hitting end-of-file first returns
    /// [`Error::OutOfRange`](crate::Error::OutOfRange) carrying the bytes
    /// that were available. With the block cache enabled every read
    /// re-validates the file's signature, so a server-side overwrite is
    /// visible on the next call.
    pub async fn read_at(&self, offset: u64, n: usize) -> Result<Vec<u8>> {
        let core = FsCore::upgrade(&self.core)?;
        core.read_object(&self.path, offset, n).await
    }
}

/// An immutable in-memory copy of an entire object.
#[derive(Debug)]
pub struct ReadOnlyMemoryRegion {
    data: Vec<u8>,
}

impl ReadOnlyMemoryRegion {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for ReadOnlyMemoryRegion {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
