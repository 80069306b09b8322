//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `requests` - Pending conversions (key: Liquid receiving address)
//! - `insertion_order` - Registration order index (key: sequence, big-endian u64)
//!
//! Both column families are always written in one atomic batch. Scans walk
//! `insertion_order` page by page with short-lived iterators (cursor
//! semantics), so a pass never blocks writers and may or may not observe
//! writes that land while it runs.

use crate::{
    error::{Error, Result},
    types::{ConversionRequest, ScanOrder},
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Column family names
const CF_REQUESTS: &str = "requests";
const CF_INSERTION_ORDER: &str = "insertion_order";

/// Index entries read per iterator
const SCAN_PAGE_SIZE: usize = 64;

/// Lazy sequence of store entries
pub type StoreIter<'a> = Box<dyn Iterator<Item = Result<(String, ConversionRequest)>> + Send + 'a>;

/// Durable map of Liquid receiving address → pending conversion
///
/// Mutations are mutually exclusive; scans are not blocked by them.
pub trait ConversionStore: Send + Sync {
    /// Insert or overwrite the request keyed by its `source_address`
    ///
    /// An overwrite moves the key to the newest insertion position.
    fn put(&self, request: &ConversionRequest) -> Result<()>;

    /// Remove an entry; removing an absent key succeeds
    fn delete(&self, key: &str) -> Result<()>;

    /// Restartable scan over all entries in the given order
    ///
    /// Undecodable records are yielded as `Error::CorruptRecord` and the
    /// scan continues past them.
    fn scan(&self, order: ScanOrder) -> StoreIter<'_>;

    /// Number of entries (may be an estimate)
    fn approximate_len(&self) -> Result<u64>;
}

impl std::fmt::Debug for dyn ConversionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConversionStore")
    }
}

/// On-disk value of the `requests` column family
#[derive(Debug, Serialize, Deserialize)]
struct StoredRequest {
    seq: u64,
    destination_address: String,
    created_at: i64,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,

    /// Serializes all mutations; holds the next insertion sequence
    write_lock: Mutex<u64>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_REQUESTS, Self::cf_options_requests()),
            ColumnFamilyDescriptor::new(CF_INSERTION_ORDER, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let next_seq = Self::recover_next_seq(&db)?;

        tracing::info!(
            path = ?path,
            next_seq,
            "Opened conversion store"
        );

        Ok(Self {
            db,
            write_lock: Mutex::new(next_seq),
        })
    }

    fn cf_options_requests() -> Options {
        let mut opts = Options::default();
        // Point lookups by address on every scan step
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    /// Sequence following the newest index entry
    fn recover_next_seq(db: &DB) -> Result<u64> {
        let cf = db
            .cf_handle(CF_INSERTION_ORDER)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_INSERTION_ORDER)))?;

        match db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let seq = decode_seq(&key).ok_or_else(|| {
                    Error::Storage(format!("Malformed insertion index key: {:?}", key))
                })?;
                Ok(seq + 1)
            }
            None => Ok(0),
        }
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn stored(&self, key: &str) -> Result<Option<StoredRequest>> {
        let cf = self.cf_handle(CF_REQUESTS)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| Error::CorruptRecord {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Index positions that point at `key`
    ///
    /// Full walk of the index; only used when the record itself cannot be
    /// decoded to learn its sequence.
    fn index_entries_for(&self, key: &str) -> Result<Vec<u64>> {
        let cf_order = self.cf_handle(CF_INSERTION_ORDER)?;
        let mut seqs = Vec::new();
        for item in self.db.iterator_cf(cf_order, IteratorMode::Start) {
            let (index_key, value) = item?;
            if &*value == key.as_bytes() {
                if let Some(seq) = decode_seq(&index_key) {
                    seqs.push(seq);
                }
            }
        }
        Ok(seqs)
    }

    /// Get a single request
    pub fn get(&self, key: &str) -> Result<Option<ConversionRequest>> {
        Ok(self.stored(key)?.map(|stored| ConversionRequest {
            source_address: key.to_string(),
            destination_address: stored.destination_address,
            created_at: stored.created_at,
        }))
    }

    /// Read one page of the insertion index after `position`
    fn read_page(
        &self,
        order: ScanOrder,
        position: Option<u64>,
        out: &mut VecDeque<Result<(String, ConversionRequest)>>,
    ) -> Result<(Option<u64>, bool)> {
        let cf_order = self.cf_handle(CF_INSERTION_ORDER)?;
        let direction = match order {
            ScanOrder::Insertion => Direction::Forward,
            ScanOrder::ReverseInsertion => Direction::Reverse,
        };

        let start = position.map(u64::to_be_bytes);
        let mode = match (&start, order) {
            (Some(seq), _) => IteratorMode::From(&seq[..], direction),
            (None, ScanOrder::Insertion) => IteratorMode::Start,
            (None, ScanOrder::ReverseInsertion) => IteratorMode::End,
        };

        let mut last = position;
        let mut read = 0usize;

        for item in self.db.iterator_cf(cf_order, mode) {
            let (key, value) = item?;
            let seq = decode_seq(&key)
                .ok_or_else(|| Error::Storage(format!("Malformed insertion index key: {:?}", key)))?;

            // The seek lands on the cursor itself when it still exists
            if Some(seq) == position {
                continue;
            }

            last = Some(seq);
            read += 1;

            match String::from_utf8(value.into_vec()) {
                Ok(address) => match self.stored(&address) {
                    // Skip index entries whose record was deleted or moved meanwhile
                    Ok(Some(stored)) if stored.seq == seq => out.push_back(Ok((
                        address.clone(),
                        ConversionRequest {
                            source_address: address,
                            destination_address: stored.destination_address,
                            created_at: stored.created_at,
                        },
                    ))),
                    Ok(_) => {}
                    Err(e) => out.push_back(Err(e)),
                },
                Err(e) => out.push_back(Err(Error::CorruptRecord {
                    key: format!("seq:{}", seq),
                    reason: e.to_string(),
                })),
            }

            if read == SCAN_PAGE_SIZE {
                return Ok((last, false));
            }
        }

        Ok((last, true))
    }

    /// Close database
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Conversion store closed");
        Ok(())
    }
}

impl ConversionStore for Storage {
    fn put(&self, request: &ConversionRequest) -> Result<()> {
        let key = request.source_address.as_str();
        let cf_requests = self.cf_handle(CF_REQUESTS)?;
        let cf_order = self.cf_handle(CF_INSERTION_ORDER)?;

        let mut next_seq = self.write_lock.lock();
        let seq = *next_seq;

        let mut batch = WriteBatch::default();

        // Overwrite: drop the previous position in the index
        match self.stored(key) {
            Ok(Some(previous)) => batch.delete_cf(cf_order, previous.seq.to_be_bytes()),
            Ok(None) => {}
            Err(Error::CorruptRecord { reason, .. }) => {
                tracing::warn!(address = %key, %reason, "Overwriting undecodable record");
                for stale in self.index_entries_for(key)? {
                    batch.delete_cf(cf_order, stale.to_be_bytes());
                }
            }
            Err(e) => return Err(e),
        }

        let stored = StoredRequest {
            seq,
            destination_address: request.destination_address.clone(),
            created_at: request.created_at,
        };
        batch.put_cf(cf_requests, key.as_bytes(), bincode::serialize(&stored)?);
        batch.put_cf(cf_order, seq.to_be_bytes(), key.as_bytes());

        self.db.write(batch)?;
        *next_seq += 1;

        tracing::debug!(address = %key, seq, "Conversion request stored");

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let cf_requests = self.cf_handle(CF_REQUESTS)?;
        let cf_order = self.cf_handle(CF_INSERTION_ORDER)?;

        let _guard = self.write_lock.lock();

        let mut batch = WriteBatch::default();
        match self.stored(key) {
            Ok(Some(stored)) => batch.delete_cf(cf_order, stored.seq.to_be_bytes()),
            // Already gone
            Ok(None) => return Ok(()),
            // Sequence is unreadable; locate the index entries by address
            Err(Error::CorruptRecord { .. }) => {
                for seq in self.index_entries_for(key)? {
                    batch.delete_cf(cf_order, seq.to_be_bytes());
                }
            }
            Err(e) => return Err(e),
        }
        batch.delete_cf(cf_requests, key.as_bytes());

        self.db.write(batch)?;

        tracing::debug!(address = %key, "Conversion request deleted");

        Ok(())
    }

    fn scan(&self, order: ScanOrder) -> StoreIter<'_> {
        Box::new(ScanCursor {
            storage: self,
            order,
            position: None,
            buffer: VecDeque::with_capacity(SCAN_PAGE_SIZE),
            exhausted: false,
        })
    }

    fn approximate_len(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_REQUESTS)?;
        // RocksDB property for approximate count
        let count = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(count)
    }
}

/// Cursor over the insertion index
struct ScanCursor<'a> {
    storage: &'a Storage,
    order: ScanOrder,
    position: Option<u64>,
    buffer: VecDeque<Result<(String, ConversionRequest)>>,
    exhausted: bool,
}

impl Iterator for ScanCursor<'_> {
    type Item = Result<(String, ConversionRequest)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() && !self.exhausted {
            match self
                .storage
                .read_page(self.order, self.position, &mut self.buffer)
            {
                Ok((position, exhausted)) => {
                    self.position = position;
                    self.exhausted = exhausted;
                }
                Err(e) => {
                    // Iterator-level failure ends this pass
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front()
    }
}

fn decode_seq(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn request(address: &str, created_at: i64) -> ConversionRequest {
        ConversionRequest {
            source_address: address.to_string(),
            destination_address: format!("plmnt-{}", address),
            created_at,
        }
    }

    fn keys(storage: &Storage, order: ScanOrder) -> Vec<String> {
        storage
            .scan(order)
            .map(|entry| entry.unwrap().0)
            .collect()
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_REQUESTS).is_some());
        assert!(storage.db.cf_handle(CF_INSERTION_ORDER).is_some());
    }

    #[test]
    fn test_put_and_get() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.put(&request("tlq1a", 100)).unwrap();

        let retrieved = storage.get("tlq1a").unwrap().unwrap();
        assert_eq!(retrieved, request("tlq1a", 100));
        assert!(storage.get("tlq1missing").unwrap().is_none());
    }

    #[test]
    fn test_scan_orders() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        // Key order deliberately differs from insertion order
        for address in ["tlq1c", "tlq1a", "tlq1b"] {
            storage.put(&request(address, 1)).unwrap();
        }

        assert_eq!(keys(&storage, ScanOrder::Insertion), vec!["tlq1c", "tlq1a", "tlq1b"]);
        assert_eq!(
            keys(&storage, ScanOrder::ReverseInsertion),
            vec!["tlq1b", "tlq1a", "tlq1c"]
        );
    }

    #[test]
    fn test_scan_spans_multiple_pages() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let total = SCAN_PAGE_SIZE * 2 + 5;
        for i in 0..total {
            storage.put(&request(&format!("tlq1-{:04}", i), i as i64)).unwrap();
        }

        let forward = keys(&storage, ScanOrder::Insertion);
        assert_eq!(forward.len(), total);
        assert_eq!(forward.first().unwrap(), "tlq1-0000");

        let reverse = keys(&storage, ScanOrder::ReverseInsertion);
        assert_eq!(reverse.len(), total);
        assert_eq!(reverse.first().unwrap(), &format!("tlq1-{:04}", total - 1));
    }

    #[test]
    fn test_overwrite_moves_to_newest() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.put(&request("tlq1a", 1)).unwrap();
        storage.put(&request("tlq1b", 2)).unwrap();
        storage.put(&request("tlq1a", 3)).unwrap();

        assert_eq!(keys(&storage, ScanOrder::Insertion), vec!["tlq1b", "tlq1a"]);
        assert_eq!(storage.get("tlq1a").unwrap().unwrap().created_at, 3);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.put(&request("tlq1a", 1)).unwrap();
        storage.delete("tlq1a").unwrap();
        storage.delete("tlq1a").unwrap();
        storage.delete("tlq1never").unwrap();

        assert!(storage.get("tlq1a").unwrap().is_none());
        assert!(keys(&storage, ScanOrder::Insertion).is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let (config, _temp) = test_config();

        {
            let storage = Storage::open(&config).unwrap();
            storage.put(&request("tlq1a", 1)).unwrap();
            storage.put(&request("tlq1b", 2)).unwrap();
            storage.close().unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        storage.put(&request("tlq1c", 3)).unwrap();

        // Recovered sequence keeps new entries newest
        assert_eq!(
            keys(&storage, ScanOrder::ReverseInsertion),
            vec!["tlq1c", "tlq1b", "tlq1a"]
        );
    }

    #[test]
    fn test_corrupt_record_is_skipped_not_deleted() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.put(&request("tlq1a", 1)).unwrap();
        storage.put(&request("tlq1b", 2)).unwrap();

        let cf = storage.cf_handle(CF_REQUESTS).unwrap();
        storage.db.put_cf(cf, b"tlq1a", [0xffu8, 0x01]).unwrap();

        let entries: Vec<_> = storage.scan(ScanOrder::Insertion).collect();
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            &entries[0],
            Err(Error::CorruptRecord { key, .. }) if key == "tlq1a"
        ));
        assert_eq!(entries[1].as_ref().unwrap().0, "tlq1b");

        // Still present for inspection
        assert!(storage.db.get_cf(cf, b"tlq1a").unwrap().is_some());
    }

    fn index_len(storage: &Storage) -> usize {
        let cf = storage.cf_handle(CF_INSERTION_ORDER).unwrap();
        storage.db.iterator_cf(cf, IteratorMode::Start).count()
    }

    #[test]
    fn test_delete_corrupt_record_drops_index_entry() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.put(&request("tlq1a", 1)).unwrap();
        storage.put(&request("tlq1b", 2)).unwrap();

        let cf = storage.cf_handle(CF_REQUESTS).unwrap();
        storage.db.put_cf(cf, b"tlq1a", [0xffu8, 0x01]).unwrap();

        storage.delete("tlq1a").unwrap();

        assert!(storage.db.get_cf(cf, b"tlq1a").unwrap().is_none());
        assert_eq!(index_len(&storage), 1);
        assert_eq!(keys(&storage, ScanOrder::Insertion), vec!["tlq1b"]);
    }

    #[test]
    fn test_overwrite_corrupt_record_drops_old_index_entry() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.put(&request("tlq1a", 1)).unwrap();
        let cf = storage.cf_handle(CF_REQUESTS).unwrap();
        storage.db.put_cf(cf, b"tlq1a", [0xffu8, 0x01]).unwrap();

        storage.put(&request("tlq1a", 5)).unwrap();

        assert_eq!(index_len(&storage), 1);
        assert_eq!(storage.get("tlq1a").unwrap().unwrap().created_at, 5);
    }

    #[test]
    fn test_delete_during_scan() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        for i in 0..10 {
            storage.put(&request(&format!("tlq1-{}", i), i)).unwrap();
        }

        let mut seen = Vec::new();
        for entry in storage.scan(ScanOrder::Insertion) {
            let (key, _) = entry.unwrap();
            storage.delete(&key).unwrap();
            seen.push(key);
        }

        assert_eq!(seen.len(), 10);
        assert!(keys(&storage, ScanOrder::Insertion).is_empty());
    }

    #[test]
    fn test_concurrent_put_and_delete() {
        let (config, _temp) = test_config();
        let storage = Arc::new(Storage::open(&config).unwrap());

        // Keys that must survive the run
        for i in 0..20 {
            storage.put(&request(&format!("keep-{}", i), i)).unwrap();
        }
        for i in 0..200 {
            storage.put(&request(&format!("drop-{}", i), i)).unwrap();
        }

        let mut workers = Vec::new();
        for t in 0..4 {
            let storage = storage.clone();
            workers.push(std::thread::spawn(move || {
                for i in 0..100 {
                    storage
                        .put(&request(&format!("new-{}-{}", t, i), i))
                        .unwrap();
                }
            }));
        }
        for t in 0..4 {
            let storage = storage.clone();
            workers.push(std::thread::spawn(move || {
                // Overlapping ranges: some deletes hit already-absent keys
                for i in (t * 40)..(t * 40 + 80).min(200) {
                    storage.delete(&format!("drop-{}", i)).unwrap();
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let remaining = keys(&storage, ScanOrder::Insertion);
        assert!(remaining.iter().all(|k| !k.starts_with("drop-")));
        assert_eq!(remaining.iter().filter(|k| k.starts_with("keep-")).count(), 20);
        assert_eq!(remaining.iter().filter(|k| k.starts_with("new-")).count(), 400);
    }
}
