// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Composable wrappers over the narrow blockstore capability: a synchronizing
//! wrapper for stores shared between threads, and an instrumented wrapper
//! recording read/write traffic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;

/// Blockstore wrapper serializing access to the underlying store with a mutex.
/// Required for any store shared between threads, so that map load/flush
/// operations observe a serial order.
#[derive(Debug, Default)]
pub struct SyncBlockstore<BS> {
    store: Mutex<BS>,
}

impl<BS: Blockstore> SyncBlockstore<BS> {
    pub fn new(store: BS) -> Self {
        Self { store: Mutex::new(store) }
    }

    /// Consumes the wrapper and returns the underlying store.
    pub fn into_inner(self) -> Result<BS> {
        self.store.into_inner().map_err(|e| anyhow!("blockstore mutex poisoned: {}", e))
    }
}

impl<BS: Blockstore> Blockstore for SyncBlockstore<BS> {
    fn get(&self, k: &Cid) -> Result<Option<Vec<u8>>> {
        self.store.lock().map_err(|e| anyhow!("blockstore mutex poisoned: {}", e))?.get(k)
    }

    fn has(&self, k: &Cid) -> Result<bool> {
        self.store.lock().map_err(|e| anyhow!("blockstore mutex poisoned: {}", e))?.has(k)
    }

    fn put_keyed(&self, k: &Cid, block: &[u8]) -> Result<()> {
        self.store
            .lock()
            .map_err(|e| anyhow!("blockstore mutex poisoned: {}", e))?
            .put_keyed(k, block)
    }
}

/// Snapshot of the traffic counters of a [`TrackingBlockstore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BSStats {
    /// Number of reads
    pub r: usize,
    /// Number of writes
    pub w: usize,
    /// Bytes read
    pub br: usize,
    /// Bytes written
    pub bw: usize,
}

/// Blockstore wrapper recording reads, writes and cumulative byte counts.
/// Read bytes are counted only for successful gets; write bytes are always
/// counted. Counters are atomic so a shared wrapper stays coherent.
#[derive(Debug, Default)]
pub struct TrackingBlockstore<BS> {
    base: BS,
    r: AtomicUsize,
    w: AtomicUsize,
    br: AtomicUsize,
    bw: AtomicUsize,
}

impl<BS: Blockstore> TrackingBlockstore<BS> {
    pub fn new(base: BS) -> Self {
        Self {
            base,
            r: AtomicUsize::new(0),
            w: AtomicUsize::new(0),
            br: AtomicUsize::new(0),
            bw: AtomicUsize::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.r.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> usize {
        self.w.load(Ordering::Relaxed)
    }

    pub fn read_size(&self) -> usize {
        self.br.load(Ordering::Relaxed)
    }

    pub fn write_size(&self) -> usize {
        self.bw.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> BSStats {
        BSStats {
            r: self.read_count(),
            w: self.write_count(),
            br: self.read_size(),
            bw: self.write_size(),
        }
    }
}

impl<BS: Blockstore> Blockstore for TrackingBlockstore<BS> {
    fn get(&self, k: &Cid) -> Result<Option<Vec<u8>>> {
        self.r.fetch_add(1, Ordering::Relaxed);
        let bytes = self.base.get(k)?;
        if let Some(bytes) = &bytes {
            self.br.fetch_add(bytes.len(), Ordering::Relaxed);
        }
        Ok(bytes)
    }

    fn has(&self, k: &Cid) -> Result<bool> {
        self.r.fetch_add(1, Ordering::Relaxed);
        self.base.has(k)
    }

    fn put_keyed(&self, k: &Cid, block: &[u8]) -> Result<()> {
        self.w.fetch_add(1, Ordering::Relaxed);
        self.bw.fetch_add(block.len(), Ordering::Relaxed);
        self.base.put_keyed(k, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_ipld_blockstore::{Block, MemoryBlockstore};
    use multihash::Code;

    #[test]
    fn tracking_store_counts_traffic() {
        let store = TrackingBlockstore::new(MemoryBlockstore::new());
        assert_eq!(store.stats(), BSStats::default());

        let block = Block::new(0x55, &b"foobar"[..]);

        // A miss is a read without bytes.
        store.get(&block.cid(Code::Blake2b256)).unwrap();
        assert_eq!(store.stats(), BSStats { r: 1, ..Default::default() });

        let cid = store.put(Code::Blake2b256, &block).unwrap();
        assert_eq!(store.get(&cid).unwrap().as_deref(), Some(block.data));
        assert_eq!(store.stats(), BSStats { r: 2, w: 1, br: block.len(), bw: block.len() });

        assert_eq!(store.read_count(), 2);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.read_size(), block.len());
        assert_eq!(store.write_size(), block.len());
    }

    #[test]
    fn sync_store_shared_between_threads() {
        let store = SyncBlockstore::new(MemoryBlockstore::new());
        std::thread::scope(|scope| {
            for i in 0u8..4 {
                let store = &store;
                scope.spawn(move || {
                    let data = vec![i; 8];
                    let block = Block::new(0x55, data.clone());
                    let cid = store.put(Code::Blake2b256, &block).unwrap();
                    assert_eq!(store.get(&cid).unwrap(), Some(data));
                });
            }
        });
    }

    #[test]
    fn wrappers_compose() {
        let store = SyncBlockstore::new(TrackingBlockstore::new(MemoryBlockstore::new()));
        let block = Block::new(0x55, &b"data"[..]);
        let cid = store.put(Code::Blake2b256, &block).unwrap();
        assert!(store.get(&cid).unwrap().is_some());

        let tracked = store.into_inner().unwrap();
        assert_eq!(tracked.stats(), BSStats { r: 1, w: 1, br: block.len(), bw: block.len() });
    }
}
