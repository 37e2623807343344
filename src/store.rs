//! Storage collaborator traits.
//!
//! The relational engine is an external collaborator; this crate never
//! issues raw queries. Backends expose a minimal key/record interface via
//! [`RecordStore`] and a digest table via [`HashStore`], both using boxed
//! async futures so implementations may block on their own I/O without this
//! engine imposing a timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbsync_engine::store::{BoxFuture, RecordStore, StoreResult};
//! use dbsync_engine::model::LocalRecord;
//!
//! struct MyBackend { /* ... */ }
//!
//! impl RecordStore for MyBackend {
//!     fn find_by_uuid(&self, _kind: &str, _uuid: &str) -> BoxFuture<'_, Option<LocalRecord>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn find_by_id(&self, _kind: &str, _id: i64) -> BoxFuture<'_, Option<LocalRecord>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn save(&self, record: LocalRecord) -> BoxFuture<'_, LocalRecord> {
//!         Box::pin(async move { Ok(record) })
//!     }
//!
//!     fn delete(&self, _kind: &str, _uuid: &str) -> BoxFuture<'_, bool> {
//!         Box::pin(async move { Ok(false) })
//!     }
//! }
//! ```
//!
//! [`InMemoryStore`] implements both traits over hash maps and is the
//! backend used throughout the test suite. It exposes fault-injection hooks
//! so tests can crash a merge between the hash write and the record write.

use crate::model::{LocalRecord, RecordHash};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Simplified error for storage operations.
///
/// Backends fold their native errors into a message; the engine wraps it
/// into [`crate::error::SyncError::Storage`] with the operation name.
#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Minimal key/record interface to the local relational store.
pub trait RecordStore: Send + Sync + 'static {
    /// Find a record of `kind` by its cross-site uuid.
    fn find_by_uuid(&self, kind: &str, uuid: &str) -> BoxFuture<'_, Option<LocalRecord>>;

    /// Find a record of `kind` by its local numeric identity.
    fn find_by_id(&self, kind: &str, id: i64) -> BoxFuture<'_, Option<LocalRecord>>;

    /// Persist a record, assigning a local identity if it has none.
    /// Returns the persisted record including its identity.
    fn save(&self, record: LocalRecord) -> BoxFuture<'_, LocalRecord>;

    /// Physically remove a record. Returns whether anything was removed.
    ///
    /// The merge engine never calls this for synchronized data (deletes are
    /// modeled as void-marker updates); it exists for administrative use.
    fn delete(&self, kind: &str, uuid: &str) -> BoxFuture<'_, bool>;
}

/// Digest table interface: one stored hash per merged record.
pub trait HashStore: Send + Sync + 'static {
    /// Fetch the stored hash for a record, if one exists.
    fn get(&self, kind: &str, uuid: &str) -> BoxFuture<'_, Option<RecordHash>>;

    /// Insert or overwrite the stored hash for a record.
    fn put(&self, hash: RecordHash) -> BoxFuture<'_, ()>;
}

/// Supplies the acting user for delete operations.
///
/// Resolved externally (login session, service identity) and injected into
/// the merge engine.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Encoded reference to the acting user, if one is configured.
    fn acting_user_ref(&self) -> Option<String>;
}

/// Identity provider with a fixed, preconfigured acting user.
#[derive(Debug, Clone, Default)]
pub struct FixedIdentity {
    acting_user: Option<String>,
}

impl FixedIdentity {
    /// Provider returning the given encoded reference.
    pub fn new(acting_user_ref: impl Into<String>) -> Self {
        Self {
            acting_user: Some(acting_user_ref.into()),
        }
    }

    /// Provider with no acting user configured.
    pub fn anonymous() -> Self {
        Self { acting_user: None }
    }
}

impl IdentityProvider for FixedIdentity {
    fn acting_user_ref(&self) -> Option<String> {
        self.acting_user.clone()
    }
}

/// In-memory implementation of [`RecordStore`] and [`HashStore`].
///
/// Local identities are assigned from a single sequence shared by all kinds,
/// matching a storage layout where joined-table extension kinds reuse their
/// base table's identity. A record saved with a preset `id` keeps it.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<(String, String), LocalRecord>>,
    hashes: RwLock<HashMap<(String, String), RecordHash>>,
    next_id: AtomicI64,
    fail_next_save: AtomicBool,
    fail_next_hash_put: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Make the next `save` fail with a storage error (fault injection).
    ///
    /// Used to simulate a crash between the hash write and the record
    /// insert; the flag clears itself after firing once.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Make the next `put` on the hash side fail (fault injection).
    pub fn fail_next_hash_put(&self) {
        self.fail_next_hash_put.store(true, Ordering::SeqCst);
    }

    /// Number of stored records across all kinds.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Number of stored hashes across all kinds.
    pub async fn hash_count(&self) -> usize {
        self.hashes.read().await.len()
    }

    /// All records of a kind, unordered.
    pub async fn records_of_kind(&self, kind: &str) -> Vec<LocalRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

impl RecordStore for InMemoryStore {
    fn find_by_uuid(&self, kind: &str, uuid: &str) -> BoxFuture<'_, Option<LocalRecord>> {
        let key = (kind.to_string(), uuid.to_string());
        Box::pin(async move { Ok(self.records.read().await.get(&key).cloned()) })
    }

    fn find_by_id(&self, kind: &str, id: i64) -> BoxFuture<'_, Option<LocalRecord>> {
        let kind = kind.to_string();
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .await
                .iter()
                .find(|((k, _), record)| *k == kind && record.id == Some(id))
                .map(|(_, record)| record.clone()))
        })
    }

    fn save(&self, mut record: LocalRecord) -> BoxFuture<'_, LocalRecord> {
        Box::pin(async move {
            if self.fail_next_save.swap(false, Ordering::SeqCst) {
                return Err(StoreError("injected save failure".to_string()));
            }
            if record.id.is_none() {
                record.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
            }
            let key = (record.kind.clone(), record.uuid.clone());
            self.records.write().await.insert(key, record.clone());
            Ok(record)
        })
    }

    fn delete(&self, kind: &str, uuid: &str) -> BoxFuture<'_, bool> {
        let key = (kind.to_string(), uuid.to_string());
        Box::pin(async move { Ok(self.records.write().await.remove(&key).is_some()) })
    }
}

impl HashStore for InMemoryStore {
    fn get(&self, kind: &str, uuid: &str) -> BoxFuture<'_, Option<RecordHash>> {
        let key = (kind.to_string(), uuid.to_string());
        Box::pin(async move { Ok(self.hashes.read().await.get(&key).cloned()) })
    }

    fn put(&self, hash: RecordHash) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_next_hash_put.swap(false, Ordering::SeqCst) {
                return Err(StoreError("injected hash put failure".to_string()));
            }
            let key = (hash.kind.clone(), hash.uuid.clone());
            self.hashes.write().await.insert(key, hash);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_assigns_sequential_ids() {
        let store = InMemoryStore::new();
        let a = store.save(LocalRecord::new("Person", "u1")).await.unwrap();
        let b = store.save(LocalRecord::new("Person", "u2")).await.unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
    }

    #[tokio::test]
    async fn test_save_keeps_preset_id() {
        let store = InMemoryStore::new();
        let mut record = LocalRecord::new("Patient", "u1");
        record.id = Some(42);
        let saved = store.save(record).await.unwrap();
        assert_eq!(saved.id, Some(42));

        let found = store.find_by_id("Patient", 42).await.unwrap();
        assert_eq!(found.unwrap().uuid, "u1");
    }

    #[tokio::test]
    async fn test_find_by_uuid_is_kind_scoped() {
        let store = InMemoryStore::new();
        store.save(LocalRecord::new("Person", "u1")).await.unwrap();
        assert!(store.find_by_uuid("Person", "u1").await.unwrap().is_some());
        assert!(store.find_by_uuid("Patient", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hash_put_and_get() {
        let store = InMemoryStore::new();
        assert!(HashStore::get(&store, "Person", "u1").await.unwrap().is_none());
        store
            .put(RecordHash::new("Person", "u1", "abc123"))
            .await
            .unwrap();
        let stored = HashStore::get(&store, "Person", "u1").await.unwrap().unwrap();
        assert_eq!(stored.digest, "abc123");
    }

    #[tokio::test]
    async fn test_fault_injection_fires_once() {
        let store = InMemoryStore::new();
        store.fail_next_save();
        assert!(store.save(LocalRecord::new("Person", "u1")).await.is_err());
        // Second attempt succeeds
        assert!(store.save(LocalRecord::new("Person", "u1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = InMemoryStore::new();
        store.save(LocalRecord::new("Person", "u1")).await.unwrap();
        assert!(RecordStore::delete(&store, "Person", "u1").await.unwrap());
        assert!(!RecordStore::delete(&store, "Person", "u1").await.unwrap());
    }

    #[test]
    fn test_fixed_identity() {
        let identity = FixedIdentity::new("app.sync.User(actor)");
        assert_eq!(identity.acting_user_ref().as_deref(), Some("app.sync.User(actor)"));
        assert!(FixedIdentity::anonymous().acting_user_ref().is_none());
    }
}
