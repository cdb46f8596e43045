//! [`AccessStore`] implementation on a single Fjall keyspace.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use pearl_types::{KeyHash, NodeId, Record, RecordPayload, RecordState};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::keys::{
    clock_key, log_key, log_scan_bounds, parse_clock_key, parse_log_key, CLOCK_TAG, LOG_TAG,
};
use crate::log::{decode_log_value, encode_log_value, ReplicationLogEntry};

type Result<T> = std::result::Result<T, StoreError>;

/// Version byte prefixed to every stored record row.
///
/// Readers must check this field and reject unknown versions rather than
/// misinterpreting the payload.
const RECORD_FORMAT_VERSION: u8 = 1;

/// Counters returned by [`AccessStore::collect_garbage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Record rows removed because their TTL passed.
    pub records_removed: usize,
    /// Replication-log entries removed because their TTL passed.
    pub log_entries_removed: usize,
}

/// Durable credential store for one node.
///
/// Holds record rows, the replication log, and the persisted clocks in one
/// ordered keyspace. Mutations serialize on an internal lock so the local
/// clock advances exactly once per committed operation; each operation is a
/// single atomic batch, so readers observe either the pre- or post-state.
pub struct AccessStore {
    db: Database,
    data: Keyspace,
    node_id: NodeId,
    tombstone_expiration: Duration,
    write_lock: Mutex<()>,
}

impl AccessStore {
    /// Open a persistent store at the given path.
    pub fn open(
        path: impl AsRef<Path>,
        node_id: NodeId,
        tombstone_expiration: Duration,
    ) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init(db, node_id, tombstone_expiration)
    }

    /// Open a temporary store (cleaned up on drop). For tests.
    pub fn open_temporary(node_id: NodeId, tombstone_expiration: Duration) -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(std::io::Error::other)?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init(db, node_id, tombstone_expiration)
    }

    fn init(db: Database, node_id: NodeId, tombstone_expiration: Duration) -> Result<Self> {
        let data = db.keyspace("records", KeyspaceCreateOptions::default)?;
        let store = Self {
            db,
            data,
            node_id,
            tombstone_expiration,
            write_lock: Mutex::new(()),
        };
        debug!(
            node_id = %store.node_id,
            clock = store.clock(&node_id)?.unwrap_or(0),
            "opened access store"
        );
        Ok(store)
    }

    /// This store's authoring node id.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Cheap liveness probe: reads the local clock row.
    pub fn health(&self) -> Result<()> {
        self.clock(&self.node_id).map(|_| ())
    }

    // -------------------------------------------------------------------
    // KV operations
    // -------------------------------------------------------------------

    /// Create a record. Fails if the key-hash is reserved or already present
    /// in any state, tombstones included.
    pub fn put(&self, key_hash: &KeyHash, payload: &RecordPayload) -> Result<()> {
        self.put_at(key_hash, payload, unix_now())
    }

    /// [`put`](Self::put) with an explicit creation time (unix seconds).
    pub fn put_at(&self, key_hash: &KeyHash, payload: &RecordPayload, now: u64) -> Result<()> {
        if key_hash.has_reserved_prefix() {
            return Err(StoreError::InvalidKey);
        }

        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        if self.data.get(key_hash.as_bytes())?.is_some() {
            return Err(StoreError::KeyAlreadyExists);
        }

        let clock = self.next_clock()?;
        let record = Record {
            node_id: self.node_id,
            clock,
            created_at: now,
            state: RecordState::Created,
            satellite_address: payload.satellite_address.clone(),
            macaroon_head: payload.macaroon_head.clone(),
            encrypted_secret_key: payload.encrypted_secret_key.clone(),
            encrypted_access_grant: payload.encrypted_access_grant.clone(),
            public: payload.public,
            expires_at: payload.expires_at,
            invalidation_reason: None,
            invalidated_at: None,
            tombstoned_at: None,
        };

        self.commit_authored(key_hash, &record)?;
        debug!(%key_hash, clock, "created record");
        Ok(())
    }

    /// Look up a record.
    ///
    /// Missing, deleted, and expired records all read as `None`; invalidated
    /// records surface [`StoreError::Invalidated`] with the recorded reason.
    pub fn get(&self, key_hash: &KeyHash) -> Result<Option<Record>> {
        self.get_at(key_hash, unix_now())
    }

    /// [`get`](Self::get) evaluated at an explicit time (unix seconds).
    pub fn get_at(&self, key_hash: &KeyHash, now: u64) -> Result<Option<Record>> {
        let Some(bytes) = self.data.get(key_hash.as_bytes())? else {
            return Ok(None);
        };
        let record = decode_record(&bytes)?;

        if record.state == RecordState::Deleted || record.is_expired(now) {
            return Ok(None);
        }
        if record.state == RecordState::Invalidated {
            return Err(StoreError::Invalidated {
                reason: record.invalidation_reason.clone().unwrap_or_default(),
            });
        }
        Ok(Some(record))
    }

    /// Raw record row, regardless of state or expiry.
    ///
    /// Replication streams rows as stored; only [`get`](Self::get) applies
    /// the visibility rules.
    pub fn record_row(&self, key_hash: &KeyHash) -> Result<Option<Record>> {
        match self.data.get(key_hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Withdraw access to a record.
    ///
    /// A no-op for absent or expired records. Otherwise the clock advances
    /// and a log entry is appended even when the record was already
    /// invalidated or deleted, so peers that missed an intermediate
    /// transition eventually observe the latest state.
    pub fn invalidate(&self, key_hash: &KeyHash, reason: &str) -> Result<()> {
        self.invalidate_at(key_hash, reason, unix_now())
    }

    /// [`invalidate`](Self::invalidate) with an explicit time (unix seconds).
    pub fn invalidate_at(&self, key_hash: &KeyHash, reason: &str, now: u64) -> Result<()> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let Some(bytes) = self.data.get(key_hash.as_bytes())? else {
            return Ok(());
        };
        let mut record = decode_record(&bytes)?;
        if record.is_expired(now) {
            return Ok(());
        }

        record.clock = self.next_clock()?;
        if record.state <= RecordState::Invalidated {
            record.state = RecordState::Invalidated;
            record.invalidation_reason = Some(reason.to_string());
            record.invalidated_at = Some(now);
        }

        self.commit_authored(key_hash, &record)?;
        debug!(%key_hash, clock = record.clock, reason, "invalidated record");
        Ok(())
    }

    /// Tombstone a record.
    ///
    /// A no-op for absent or expired records. Re-deleting advances the clock
    /// and re-emits the log entry without refreshing the tombstone time.
    pub fn delete(&self, key_hash: &KeyHash) -> Result<()> {
        self.delete_at(key_hash, unix_now())
    }

    /// [`delete`](Self::delete) with an explicit time (unix seconds).
    pub fn delete_at(&self, key_hash: &KeyHash, now: u64) -> Result<()> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let Some(bytes) = self.data.get(key_hash.as_bytes())? else {
            return Ok(());
        };
        let mut record = decode_record(&bytes)?;
        if record.is_expired(now) {
            return Ok(());
        }

        record.clock = self.next_clock()?;
        if record.state != RecordState::Deleted {
            record.state = RecordState::Deleted;
            record.tombstoned_at = Some(now);
        }

        self.commit_authored(key_hash, &record)?;
        debug!(%key_hash, clock = record.clock, "deleted record");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Replication ingest
    // -------------------------------------------------------------------

    /// Apply a record received from a peer. Used by the replicator; not a
    /// gateway-facing operation.
    ///
    /// Upserts the log entry keyed by the record's authoring node and clock,
    /// merges the record row monotonically (state never regresses; the
    /// earliest invalidation reason wins), and advances the stored view of
    /// the author's clock — all in one atomic batch. The local node's own
    /// clock is never touched.
    pub fn insert_replicated(&self, key_hash: &KeyHash, incoming: &Record) -> Result<()> {
        if incoming.node_id == self.node_id {
            warn!(%key_hash, "dropping replicated record authored by this node");
            return Ok(());
        }

        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let row = match self.data.get(key_hash.as_bytes())? {
            None => Some(incoming.clone()),
            Some(bytes) => {
                let local = decode_record(&bytes)?;
                if local.node_id != incoming.node_id {
                    warn!(
                        %key_hash,
                        local_author = %local.node_id,
                        incoming_author = %incoming.node_id,
                        "dropping replicated record with conflicting author"
                    );
                    return Ok(());
                }
                if incoming.state > local.state {
                    let mut merged = incoming.clone();
                    if local.invalidation_reason.is_some() {
                        merged.invalidation_reason = local.invalidation_reason;
                        merged.invalidated_at = local.invalidated_at;
                    }
                    Some(merged)
                } else {
                    None
                }
            }
        };

        let ttl = self.record_ttl(row.as_ref().unwrap_or(incoming));
        let observed = self
            .read_clock(&incoming.node_id)?
            .unwrap_or(0)
            .max(incoming.clock);

        let mut batch = self.db.batch();
        if let Some(record) = &row {
            batch.insert(&self.data, key_hash.as_bytes(), encode_record(record)?);
        }
        batch.insert(
            &self.data,
            log_key(&incoming.node_id, incoming.clock, key_hash),
            encode_log_value(incoming.state, ttl),
        );
        batch.insert(
            &self.data,
            clock_key(&incoming.node_id),
            observed.to_be_bytes(),
        );
        batch.commit()?;

        debug!(
            %key_hash,
            author = %incoming.node_id,
            clock = incoming.clock,
            applied = row.is_some(),
            "ingested replicated record"
        );
        Ok(())
    }

    // -------------------------------------------------------------------
    // Replication log and clocks
    // -------------------------------------------------------------------

    /// Log entries authored by `node_id` with clock strictly greater than
    /// `after`, oldest first, at most `limit`.
    pub fn read_log_after(
        &self,
        node_id: &NodeId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<ReplicationLogEntry>> {
        let mut entries = Vec::new();
        if limit == 0 {
            return Ok(entries);
        }
        let Some((start, end)) = log_scan_bounds(node_id, after) else {
            return Ok(entries);
        };

        for guard in self.data.range(start..=end) {
            let (key, value) = guard.into_inner()?;
            let (entry_node, clock, key_hash) = parse_log_key(&key)
                .ok_or_else(|| StoreError::CorruptData("malformed log key".to_string()))?;
            let (state, _ttl) = decode_log_value(&value)?;
            entries.push(ReplicationLogEntry {
                node_id: entry_node,
                clock,
                key_hash,
                state,
            });
            if entries.len() == limit {
                break;
            }
        }
        Ok(entries)
    }

    /// Every log entry in the store, in `(node_id, clock)` order. For tests
    /// and convergence checks.
    pub fn log_entries(&self) -> Result<Vec<ReplicationLogEntry>> {
        let mut entries = Vec::new();
        for guard in self.data.prefix(LOG_TAG) {
            let (key, value) = guard.into_inner()?;
            let (node_id, clock, key_hash) = parse_log_key(&key)
                .ok_or_else(|| StoreError::CorruptData("malformed log key".to_string()))?;
            let (state, _ttl) = decode_log_value(&value)?;
            entries.push(ReplicationLogEntry {
                node_id,
                clock,
                key_hash,
                state,
            });
        }
        Ok(entries)
    }

    /// Persisted clock for a node: the local node's own clock, or the
    /// observed high-water for a peer.
    pub fn clock(&self, node_id: &NodeId) -> Result<Option<u64>> {
        self.read_clock(node_id)
    }

    /// All persisted clock rows, local node included.
    pub fn clock_views(&self) -> Result<Vec<(NodeId, u64)>> {
        let mut views = Vec::new();
        for guard in self.data.prefix(CLOCK_TAG) {
            let (key, value) = guard.into_inner()?;
            let Some(node_id) = parse_clock_key(&key) else {
                continue;
            };
            views.push((node_id, decode_clock(&value)?));
        }
        Ok(views)
    }

    // -------------------------------------------------------------------
    // Garbage collection
    // -------------------------------------------------------------------

    /// Remove record rows and log entries whose TTL has passed.
    ///
    /// Tombstones live for `tombstone_expiration` past their deletion;
    /// expiring records live until `expires_at`. Clock rows are never
    /// collected.
    pub fn collect_garbage(&self, now: u64) -> Result<GcStats> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        let mut dead_rows = Vec::new();
        let mut dead_entries = Vec::new();

        for guard in self.data.iter() {
            let (key, value) = guard.into_inner()?;
            if key.len() == 32 && key[0] != pearl_types::RESERVED_TAG_BYTE {
                let record = decode_record(&value)?;
                if let Some(ttl) = self.record_ttl(&record) {
                    if now > ttl {
                        dead_rows.push(key.to_vec());
                    }
                }
            } else if key.starts_with(LOG_TAG) {
                let (_state, ttl) = decode_log_value(&value)?;
                if let Some(ttl) = ttl {
                    if now > ttl {
                        dead_entries.push(key.to_vec());
                    }
                }
            }
        }

        let stats = GcStats {
            records_removed: dead_rows.len(),
            log_entries_removed: dead_entries.len(),
        };
        if stats == GcStats::default() {
            return Ok(stats);
        }

        let mut batch = self.db.batch();
        for key in &dead_rows {
            batch.remove(&self.data, key.as_slice());
        }
        for key in &dead_entries {
            batch.remove(&self.data, key.as_slice());
        }
        batch.commit()?;

        debug!(
            records = stats.records_removed,
            log_entries = stats.log_entries_removed,
            "collected expired rows"
        );
        Ok(stats)
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    /// Next clock value for a locally authored mutation. Caller must hold
    /// the write lock; the value is persisted by the following commit.
    fn next_clock(&self) -> Result<u64> {
        Ok(self.read_clock(&self.node_id)?.unwrap_or(0) + 1)
    }

    fn read_clock(&self, node_id: &NodeId) -> Result<Option<u64>> {
        match self.data.get(clock_key(node_id))? {
            Some(bytes) => Ok(Some(decode_clock(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Commit a locally authored record state: row, log entry, and clock in
    /// one batch.
    fn commit_authored(&self, key_hash: &KeyHash, record: &Record) -> Result<()> {
        let ttl = self.record_ttl(record);

        let mut batch = self.db.batch();
        batch.insert(&self.data, key_hash.as_bytes(), encode_record(record)?);
        batch.insert(
            &self.data,
            log_key(&record.node_id, record.clock, key_hash),
            encode_log_value(record.state, ttl),
        );
        batch.insert(
            &self.data,
            clock_key(&record.node_id),
            record.clock.to_be_bytes(),
        );
        batch.commit()?;
        Ok(())
    }

    /// Effective TTL of a record row in unix seconds, `None` for rows that
    /// never expire on their own.
    fn record_ttl(&self, record: &Record) -> Option<u64> {
        match record.state {
            RecordState::Deleted => {
                let base = record.tombstoned_at.unwrap_or(record.created_at);
                let tombstone = base.saturating_add(self.tombstone_expiration.as_secs());
                Some(record.expires_at.map_or(tombstone, |e| e.max(tombstone)))
            }
            _ => record.expires_at,
        }
    }
}

fn encode_record(record: &Record) -> Result<Vec<u8>> {
    let mut value = vec![RECORD_FORMAT_VERSION];
    value.extend(postcard::to_allocvec(record)?);
    Ok(value)
}

fn decode_record(value: &[u8]) -> Result<Record> {
    match value.split_first() {
        Some((&RECORD_FORMAT_VERSION, rest)) => Ok(postcard::from_bytes(rest)?),
        Some((&version, _)) => Err(StoreError::CorruptData(format!(
            "unsupported record format version {version}"
        ))),
        None => Err(StoreError::CorruptData("empty record row".to_string())),
    }
}

fn decode_clock(value: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = value
        .as_ref()
        .try_into()
        .map_err(|_| StoreError::CorruptData("clock value expected 8 bytes".to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Current wall-clock time in unix seconds.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
