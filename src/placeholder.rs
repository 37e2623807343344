//! Placeholder resolution for forward references.
//!
//! A change record may reference a row that has not been synchronized yet.
//! The resolver returns the referenced record's local identity, materializing
//! a minimal, clearly-marked stand-in when no row exists:
//!
//! - mandatory fields filled with the registry's placeholder defaults,
//! - `created_at` and `voided_at` pinned to the fixed epoch date,
//! - void markers set to the placeholder sentinel.
//!
//! After a complete synchronization pass no placeholder should remain: each
//! is overwritten in place when its real change record arrives (the merge
//! engine skips conflict checking for placeholders, which have no real prior
//! state).

use crate::error::{Result, SyncError};
use crate::model::{
    default_date, LocalRecord, DEFAULT_STRING, FIELD_VOIDED, FIELD_VOIDED_AT, FIELD_VOIDED_BY,
    FIELD_VOID_REASON, PLACEHOLDER_VOID_REASON,
};
use crate::registry::KindRegistry;
use crate::store::RecordStore;
use crate::{metrics, reference::DecodedReference};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves `(kind, uuid)` pairs to local identities, creating placeholders
/// on demand.
pub struct PlaceholderResolver<S: RecordStore> {
    store: Arc<S>,
    registry: Arc<KindRegistry>,
}

impl<S: RecordStore> PlaceholderResolver<S> {
    pub fn new(store: Arc<S>, registry: Arc<KindRegistry>) -> Self {
        Self { store, registry }
    }

    /// Resolve a reference to its local identity.
    ///
    /// `None` uuid means "no reference" and resolves to no identity. When no
    /// row exists for the uuid, a placeholder is persisted and its freshly
    /// assigned identity returned.
    pub async fn resolve_or_create(&self, kind: &str, uuid: Option<&str>) -> Result<Option<i64>> {
        let Some(uuid) = uuid else {
            return Ok(None);
        };

        let spec = self.registry.get(kind)?;

        if let Some(existing) = self
            .store
            .find_by_uuid(kind, uuid)
            .await
            .map_err(|e| SyncError::storage("find_by_uuid", e.0))?
        {
            debug!(kind = %kind, uuid = %uuid, "Reference resolved to existing record");
            return Ok(existing.id);
        }

        let mut placeholder = LocalRecord::new(kind, uuid);
        placeholder.created_at = default_date();
        placeholder.fields = spec.placeholder_defaults.clone();
        placeholder
            .fields
            .insert(FIELD_VOIDED.to_string(), Value::Bool(true));
        placeholder.fields.insert(
            FIELD_VOID_REASON.to_string(),
            Value::String(PLACEHOLDER_VOID_REASON.to_string()),
        );
        placeholder.fields.insert(
            FIELD_VOIDED_BY.to_string(),
            Value::String(DEFAULT_STRING.to_string()),
        );
        placeholder.fields.insert(
            FIELD_VOIDED_AT.to_string(),
            Value::String(default_date().to_rfc3339()),
        );

        // An extension kind stores its rows against the base table's
        // identity; reuse it when the base row already exists.
        if let Some(base) = self.registry.base_of(kind)? {
            if let Some(base_row) = self
                .store
                .find_by_uuid(&base.name, uuid)
                .await
                .map_err(|e| SyncError::storage("find_by_uuid", e.0))?
            {
                info!(
                    kind = %kind,
                    base = %base.name,
                    uuid = %uuid,
                    "Reusing base table identity for extension placeholder"
                );
                placeholder.id = base_row.id;
            }
        }

        let saved = self
            .store
            .save(placeholder)
            .await
            .map_err(|e| SyncError::storage("save", e.0))?;

        info!(kind = %kind, uuid = %uuid, id = ?saved.id, "Created placeholder record");
        metrics::record_placeholder_created(kind);

        Ok(saved.id)
    }

    /// Resolve a decoded reference.
    pub async fn resolve_reference(&self, reference: &DecodedReference) -> Result<Option<i64>> {
        self.resolve_or_create(&reference.kind, Some(&reference.uuid))
            .await
    }

    /// Resolve the well-known singleton placeholder for a kind.
    ///
    /// Used when a reference must exist but no specific uuid is known yet;
    /// the uuid is deterministic per kind, so every caller converges on the
    /// same row.
    pub async fn resolve_or_create_singleton(&self, kind: &str) -> Result<Option<i64>> {
        let uuid = self.registry.get(kind)?.singleton_uuid();
        self.resolve_or_create(kind, Some(&uuid)).await
    }
}
