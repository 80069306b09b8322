//! In-memory conversion store
//!
//! Same contract as the RocksDB store without durability. Intended for
//! tests; scans iterate a snapshot taken when the scan starts.

use crate::storage::{ConversionStore, StoreIter};
use crate::types::{ConversionRequest, ScanOrder};
use crate::Result;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    by_seq: BTreeMap<u64, ConversionRequest>,
    seq_by_key: HashMap<String, u64>,
}

/// Volatile store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().seq_by_key.contains_key(key)
    }
}

impl ConversionStore for MemoryStore {
    fn put(&self, request: &ConversionRequest) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.seq_by_key.remove(&request.source_address) {
            inner.by_seq.remove(&previous);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_seq.insert(seq, request.clone());
        inner.seq_by_key.insert(request.source_address.clone(), seq);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(seq) = inner.seq_by_key.remove(key) {
            inner.by_seq.remove(&seq);
        }
        Ok(())
    }

    fn scan(&self, order: ScanOrder) -> StoreIter<'_> {
        let mut snapshot: Vec<_> = self
            .inner
            .lock()
            .by_seq
            .values()
            .map(|request| Ok((request.source_address.clone(), request.clone())))
            .collect();

        if order == ScanOrder::ReverseInsertion {
            snapshot.reverse();
        }

        Box::new(snapshot.into_iter())
    }

    fn approximate_len(&self) -> Result<u64> {
        Ok(self.inner.lock().by_seq.len() as u64)
    }
}
