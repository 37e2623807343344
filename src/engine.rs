//! The merge engine.
//!
//! Applies incoming change records to the local store under hash-anchored
//! optimistic concurrency. For every merged record a digest of the last
//! merged payload is kept in the hash store; on the next change for the same
//! uuid the digest tells apart four situations:
//!
//! - no record and no hash: a genuinely new record,
//! - no record but a hash: retry of an insert that was interrupted between
//!   writing the hash and writing the record,
//! - record present, local digest differs from the stored hash but matches
//!   the incoming payload: a safe replay of an already-merged change,
//! - record present, local digest differs from both: a local edit raced the
//!   incoming change, and the merge is rejected as a conflict.
//!
//! Deletes are merged as void-marker updates and flow through the same
//! update path, so a conflicting local edit also blocks a delete.
//!
//! Merges for the same uuid are serialized through a per-uuid async mutex;
//! changes for distinct uuids proceed concurrently.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::hash::compute_digest;
use crate::model::{
    ChangeEnvelope, ChangeRecord, LocalRecord, RecordHash, SyncOperation, DELETE_VOID_REASON,
    FIELD_VOIDED_BY,
};
use crate::normalize::SiteNormalizer;
use crate::placeholder::PlaceholderResolver;
use crate::reference::{self, DecodedReference};
use crate::registry::{KindRegistry, KindSpec};
use crate::site::SiteRegistry;
use crate::store::{HashStore, IdentityProvider, RecordStore};
use crate::metrics;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Outcome of applying one change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new local record was created.
    Inserted { kind: String, uuid: String, id: i64 },
    /// An existing local record was overwritten.
    Updated { kind: String, uuid: String, id: i64 },
    /// A delete arrived for a record that never existed locally.
    DeleteIgnored { kind: String, uuid: String },
    /// The change's kind is excluded from merging.
    Skipped { kind: String, uuid: String },
}

impl Applied {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Applied::Inserted { .. } | Applied::Updated { .. })
    }
}

/// Per-uuid lock table. Entries are pruned opportunistically once the table
/// grows past a threshold; an entry is only removed while nobody holds or
/// awaits its mutex.
#[derive(Default)]
struct UuidLocks {
    inner: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

const LOCK_PRUNE_THRESHOLD: usize = 1024;

impl UuidLocks {
    async fn acquire(&self, uuid: &str) -> OwnedMutexGuard<()> {
        let slot = {
            // The map only holds Arc handles, so a guard recovered from a
            // poisoned lock is still consistent.
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if map.len() > LOCK_PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(map.entry(uuid.to_string()).or_default())
        };
        slot.lock_owned().await
    }
}

/// Applies change records to local storage. See the module docs for the
/// merge rules.
pub struct MergeEngine<S: RecordStore, H: HashStore, I: IdentityProvider> {
    store: Arc<S>,
    hashes: Arc<H>,
    identity: Arc<I>,
    registry: Arc<KindRegistry>,
    normalizer: SiteNormalizer,
    resolver: PlaceholderResolver<S>,
    locks: UuidLocks,
    excluded_kinds: HashSet<String>,
}

impl<S: RecordStore, H: HashStore, I: IdentityProvider> MergeEngine<S, H, I> {
    pub fn new(
        config: SyncConfig,
        registry: KindRegistry,
        store: Arc<S>,
        hashes: Arc<H>,
        identity: Arc<I>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(registry);
        let sites = Arc::new(SiteRegistry::new(config.sites));
        Ok(Self {
            resolver: PlaceholderResolver::new(Arc::clone(&store), Arc::clone(&registry)),
            normalizer: SiteNormalizer::new(config.site_separator, sites),
            store,
            hashes,
            identity,
            registry,
            locks: UuidLocks::default(),
            excluded_kinds: config.excluded_kinds.into_iter().collect(),
        })
    }

    /// Parse and apply a wire envelope.
    pub async fn apply_envelope(&self, envelope: ChangeEnvelope) -> Result<Applied> {
        self.apply(envelope.into_change_record()?).await
    }

    /// Apply one change record.
    ///
    /// On a [`SyncError::ConflictDetected`] return both the local record and
    /// its stored hash are untouched; the change can be parked and retried
    /// after manual resolution.
    pub async fn apply(&self, mut change: ChangeRecord) -> Result<Applied> {
        if self.excluded_kinds.contains(&change.kind) {
            warn!(kind = %change.kind, uuid = %change.uuid, "Kind is excluded, skipping change");
            metrics::record_merge_skipped(&change.kind);
            return Ok(Applied::Skipped {
                kind: change.kind,
                uuid: change.uuid,
            });
        }

        let spec = self.registry.get(&change.kind)?;
        let started = Instant::now();

        // One merge at a time per uuid; held until the record and hash
        // writes are both done.
        let _guard = self.locks.acquire(&change.uuid).await;

        if change.operation != SyncOperation::Delete {
            self.normalizer.normalize(spec, &mut change);
        }

        // Decode every reference up front so a malformed one rejects the
        // change before any write, then materialize targets.
        let references = Self::decode_references(&self.registry, &change)?;
        for decoded in &references {
            self.resolver.resolve_reference(decoded).await?;
        }

        let existing = self
            .store
            .find_by_uuid(&change.kind, &change.uuid)
            .await
            .map_err(|e| SyncError::storage("find_by_uuid", e.0))?;

        let outcome = match change.operation {
            SyncOperation::Delete => self.apply_delete(spec, existing, change).await?,
            SyncOperation::Create | SyncOperation::Update => match existing {
                Some(existing) => self.merge_existing(existing, change).await?,
                None => self.insert(spec, change).await?,
            },
        };

        metrics::record_merge_duration(&spec.name, started.elapsed());
        Ok(outcome)
    }

    fn decode_references(
        registry: &KindRegistry,
        change: &ChangeRecord,
    ) -> Result<Vec<DecodedReference>> {
        let mut decoded = Vec::new();
        for (field, value) in &change.fields {
            if !reference::is_reference_field(field) {
                continue;
            }
            let Some(encoded) = value.as_str() else {
                continue;
            };
            if encoded.is_empty() {
                continue;
            }
            decoded.push(reference::decode(registry, field, encoded)?);
        }
        Ok(decoded)
    }

    /// Merge a delete: set void markers on the existing record and run the
    /// result through the normal update path. A delete for a record that
    /// never existed is acknowledged without effect.
    async fn apply_delete(
        &self,
        spec: &KindSpec,
        existing: Option<LocalRecord>,
        change: ChangeRecord,
    ) -> Result<Applied> {
        let Some(existing) = existing else {
            info!(
                kind = %spec.name,
                uuid = %change.uuid,
                "Ignoring delete for a record that does not exist locally"
            );
            metrics::record_delete_ignored(&spec.name);
            return Ok(Applied::DeleteIgnored {
                kind: change.kind,
                uuid: change.uuid,
            });
        };

        let acting_user = self.identity.acting_user_ref();
        if let Some(encoded) = &acting_user {
            let decoded = reference::decode(&self.registry, FIELD_VOIDED_BY, encoded)?;
            self.resolver.resolve_reference(&decoded).await?;
        }

        // Reuse the record helper so marker fields stay consistent with the
        // rest of the crate.
        let mut work = existing.clone();
        work.set_void_markers(DELETE_VOID_REASON, acting_user.as_deref());

        let voided = ChangeRecord {
            kind: change.kind,
            uuid: change.uuid,
            fields: work.fields,
            operation: SyncOperation::Update,
            source_site_id: change.source_site_id,
            created_at: existing.created_at,
            changed_at: Some(Utc::now()),
        };

        self.merge_existing(existing, voided).await
    }

    /// Merge a change into an existing local record.
    async fn merge_existing(
        &self,
        existing: LocalRecord,
        change: ChangeRecord,
    ) -> Result<Applied> {
        let kind = change.kind.clone();
        let uuid = change.uuid.clone();
        let new_digest = compute_digest(&uuid, &change.fields);

        let stored = self
            .hashes
            .get(&kind, &uuid)
            .await
            .map_err(|e| SyncError::storage("hash get", e.0))?;

        // A placeholder has no real prior state to protect, so it carries no
        // stored hash and is exempt from conflict checking.
        if existing.is_placeholder() {
            debug!(kind = %kind, uuid = %uuid, "Overwriting placeholder with real record");
        } else {
            let stored = stored.as_ref().ok_or_else(|| SyncError::HashIntegrity {
                kind: kind.clone(),
                uuid: uuid.clone(),
            })?;
            let current_digest = compute_digest(&uuid, &existing.fields);
            if current_digest != stored.digest {
                if current_digest == new_digest {
                    info!(
                        kind = %kind,
                        uuid = %uuid,
                        "Local state already matches the incoming payload, replaying safely"
                    );
                    metrics::record_safe_replay(&kind);
                } else {
                    warn!(
                        kind = %kind,
                        uuid = %uuid,
                        "Local record was modified since the last merge, rejecting change"
                    );
                    metrics::record_conflict(&kind);
                    return Err(SyncError::conflict(kind, uuid));
                }
            }
        }

        let mut updated = LocalRecord {
            kind: kind.clone(),
            id: existing.id,
            uuid: uuid.clone(),
            fields: change.fields,
            created_at: existing.created_at,
            changed_at: change.changed_at.or_else(|| Some(Utc::now())),
        };
        // A real record replacing a placeholder drops the placeholder
        // markers unless the incoming change voids the record itself.
        if existing.is_placeholder() && !updated.is_voided() {
            updated.clear_void_markers();
        }

        // Record first, hash second: a crash in between is healed on replay
        // by the safe-replay rule.
        let saved = self
            .store
            .save(updated)
            .await
            .map_err(|e| SyncError::storage("save", e.0))?;

        let mut hash = match stored {
            Some(hash) => hash,
            None => RecordHash::new(&kind, &uuid, ""),
        };
        hash.digest = new_digest;
        hash.changed_at = Some(Utc::now());
        self.hashes
            .put(hash)
            .await
            .map_err(|e| SyncError::storage("hash put", e.0))?;

        let id = saved.id.unwrap_or_default();
        info!(kind = %kind, uuid = %uuid, id, "Updated record");
        metrics::record_merge_applied(&kind, "update");
        Ok(Applied::Updated { kind, uuid, id })
    }

    /// Insert a record seen for the first time at this site.
    async fn insert(&self, spec: &KindSpec, change: ChangeRecord) -> Result<Applied> {
        let kind = change.kind.clone();
        let uuid = change.uuid.clone();
        let digest = compute_digest(&uuid, &change.fields);

        // Hash first, record second: an orphaned hash marks an interrupted
        // insert and is overwritten on the retry.
        let stored = self
            .hashes
            .get(&kind, &uuid)
            .await
            .map_err(|e| SyncError::storage("hash get", e.0))?;
        let hash = match stored {
            None => RecordHash::new(&kind, &uuid, digest),
            Some(mut hash) => {
                info!(
                    kind = %kind,
                    uuid = %uuid,
                    "Found an orphaned hash with no record, retrying an interrupted insert"
                );
                hash.digest = digest;
                hash.changed_at = Some(Utc::now());
                hash
            }
        };
        self.hashes
            .put(hash)
            .await
            .map_err(|e| SyncError::storage("hash put", e.0))?;

        let mut record = LocalRecord::new(&kind, &uuid);
        record.fields = change.fields;
        record.created_at = change.created_at;
        record.changed_at = change.changed_at;

        // An extension kind shares its base table's identity.
        if let Some(base) = self.registry.base_of(&kind)? {
            if let Some(base_row) = self
                .store
                .find_by_uuid(&base.name, &uuid)
                .await
                .map_err(|e| SyncError::storage("find_by_uuid", e.0))?
            {
                debug!(
                    kind = %kind,
                    base = %base.name,
                    uuid = %uuid,
                    "Reusing base table identity for extension record"
                );
                record.id = base_row.id;
            }
        }

        let saved = self
            .store
            .save(record)
            .await
            .map_err(|e| SyncError::storage("save", e.0))?;

        let id = saved.id.unwrap_or_default();
        info!(kind = %spec.name, uuid = %uuid, id, "Inserted record");
        metrics::record_merge_applied(&kind, "insert");
        Ok(Applied::Inserted { kind, uuid, id })
    }
}
