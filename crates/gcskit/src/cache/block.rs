//! Read-side block cache.
//!
//! Blocks are keyed by `(path, aligned_offset)` and guarded by a per-file
//! [`Signature`]: the `(size, mtime, generation)` triple the metadata
//! endpoint reported when the blocks were fetched. Any signature change
//! purges every block of that file, so a caller re-reading the same offset
//! across a server-side overwrite sees the new bytes.
//!
//! Concurrency: each block is filled through a `tokio::sync::OnceCell`, so
//! any number of concurrent readers of a missing block cost exactly one
//! in-flight fetch; the structural map is guarded by a `std::sync::Mutex`
//! that is never held across an await point.

// Mutex::lock().unwrap() only panics on lock poisoning (a prior panic while
// holding the lock). Corrupted cache state should not propagate.
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;

use crate::error::{Error, Result};

/// Identity of one file version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub size: u64,
    pub mtime_nsec: i64,
    pub generation: u64,
}

struct BlockSlot {
    cell: OnceCell<Vec<u8>>,
}

struct BlockHandle {
    slot: Arc<BlockSlot>,
    created: Instant,
    /// LRU position; assigned once the block is filled and accounted.
    lru_seq: Option<u64>,
    len: usize,
}

struct FileEntry {
    signature: Signature,
    blocks: HashMap<u64, BlockHandle>,
}

#[derive(Default)]
struct State {
    files: HashMap<String, FileEntry>,
    /// LRU order over filled blocks: seq → (path, aligned offset).
    lru: BTreeMap<u64, (String, u64)>,
    next_seq: u64,
    total_bytes: u64,
}

/// LRU-bounded block map with per-file signature invalidation.
pub struct BlockCache {
    block_size: u64,
    max_bytes: u64,
    max_staleness: Option<Duration>,
    state: Mutex<State>,
}

impl BlockCache {
    pub fn new(block_size: u64, max_bytes: u64, max_staleness: Option<Duration>) -> Self {
        Self {
            block_size,
            max_bytes,
            max_staleness,
            state: Mutex::new(State::default()),
        }
    }

    /// Read `n` bytes at `offset`, fetching missing blocks via `fetch`
    /// (which receives an aligned offset and the exact byte count to
    /// request). A read that cannot be fully satisfied returns
    /// `Error::OutOfRange` carrying the bytes produced so far.
    pub async fn read<F, Fut>(
        &self,
        path: &str,
        signature: Signature,
        offset: u64,
        n: usize,
        fetch: F,
    ) -> Result<Vec<u8>>
    where
        F: Fn(u64, usize) -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        if n == 0 {
            return Ok(Vec::new());
        }
        let end = offset + n as u64;
        let mut out = Vec::with_capacity(n);
        let mut block_offset = (offset / self.block_size) * self.block_size;

        while block_offset < end {
            let slot = self.slot_for(path, signature, block_offset);
            let data = slot
                .cell
                .get_or_try_init(|| fetch(block_offset, self.block_size as usize))
                .await?;
            self.account_filled(path, block_offset, data.len());

            let block_end = block_offset + data.len() as u64;
            let short = (data.len() as u64) < self.block_size;
            if short && block_end < signature.size {
                // A non-final block came up short while the signature we
                // fetched under claims the file extends further: the stat
                // and media reads raced a concurrent overwrite.
                self.invalidate(path);
                return Err(Error::internal(format!(
                    "file contents are inconsistent for file: {path}"
                )));
            }

            let copy_start = offset.max(block_offset);
            let copy_end = end.min(block_end);
            if copy_start < copy_end {
                let lo = (copy_start - block_offset) as usize;
                let hi = (copy_end - block_offset) as usize;
                out.extend_from_slice(&data[lo..hi]);
            }
            if short {
                break;
            }
            block_offset += self.block_size;
        }

        if (out.len() as u64) < n as u64 {
            return Err(Error::out_of_range(
                format!("EOF reached reading {n} bytes at offset {offset} of {path}"),
                out,
            ));
        }
        Ok(out)
    }

    /// Drop every block and record for `path`.
    pub fn invalidate(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.files.remove(path) {
            for handle in entry.blocks.values() {
                if let Some(seq) = handle.lru_seq {
                    state.lru.remove(&seq);
                    state.total_bytes -= handle.len as u64;
                }
            }
        }
    }

    /// Full reset.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = State::default();
    }

    /// Total bytes currently held.
    #[cfg(test)]
    pub(crate) fn cached_bytes(&self) -> u64 {
        self.state.lock().unwrap().total_bytes
    }

    /// Look up or create the slot for one block, reconciling the file's
    /// signature and discarding stale blocks on the way.
    fn slot_for(&self, path: &str, signature: Signature, block_offset: u64) -> Arc<BlockSlot> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        let purge = match state.files.get(path) {
            Some(entry) => entry.signature != signature,
            None => false,
        };
        if purge {
            tracing::debug!(path, "file signature changed, purging cached blocks");
            if let Some(entry) = state.files.remove(path) {
                for handle in entry.blocks.values() {
                    if let Some(seq) = handle.lru_seq {
                        state.lru.remove(&seq);
                        state.total_bytes -= handle.len as u64;
                    }
                }
            }
        }

        let entry = state
            .files
            .entry(path.to_string())
            .or_insert_with(|| FileEntry {
                signature,
                blocks: HashMap::new(),
            });

        if let Some(staleness) = self.max_staleness {
            let stale = entry
                .blocks
                .get(&block_offset)
                .is_some_and(|h| h.created.elapsed() > staleness);
            if stale {
                if let Some(handle) = entry.blocks.remove(&block_offset) {
                    if let Some(seq) = handle.lru_seq {
                        state.lru.remove(&seq);
                        state.total_bytes -= handle.len as u64;
                    }
                }
            }
        }

        let handle = entry.blocks.entry(block_offset).or_insert_with(|| BlockHandle {
            slot: Arc::new(BlockSlot {
                cell: OnceCell::new(),
            }),
            created: Instant::now(),
            lru_seq: None,
            len: 0,
        });

        // Touch: move a filled block to the back of the LRU order.
        if let Some(old_seq) = handle.lru_seq.take() {
            state.lru.remove(&old_seq);
            let seq = state.next_seq;
            state.next_seq += 1;
            handle.lru_seq = Some(seq);
            state.lru.insert(seq, (path.to_string(), block_offset));
        }

        handle.slot.clone()
    }

    /// Record a freshly filled block's size and evict past the byte budget.
    fn account_filled(&self, path: &str, block_offset: u64, len: usize) {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        let Some(entry) = state.files.get_mut(path) else {
            return;
        };
        let Some(handle) = entry.blocks.get_mut(&block_offset) else {
            return;
        };
        if handle.lru_seq.is_some() {
            return; // already accounted
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        handle.lru_seq = Some(seq);
        handle.len = len;
        state.lru.insert(seq, (path.to_string(), block_offset));
        state.total_bytes += len as u64;

        while state.total_bytes > self.max_bytes {
            let Some((&oldest, _)) = state.lru.iter().next() else {
                break;
            };
            let Some((victim_path, victim_offset)) = state.lru.remove(&oldest) else {
                break;
            };
            if let Some(victim_entry) = state.files.get_mut(&victim_path) {
                if let Some(victim) = victim_entry.blocks.remove(&victim_offset) {
                    state.total_bytes -= victim.len as u64;
                }
                if victim_entry.blocks.is_empty() {
                    state.files.remove(&victim_path);
                }
            }
        }
    }
}
