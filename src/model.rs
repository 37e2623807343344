//! Data model for synchronized records.
//!
//! Three shapes move through the engine:
//!
//! - [`ChangeRecord`]: the incoming unit of synchronization, delivered by the
//!   external transport.
//! - [`LocalRecord`]: the persisted representation at the receiving site.
//! - [`RecordHash`]: the stored digest of the last successfully merged
//!   payload for a uuid.
//!
//! Local numeric identities are storage-assigned and never transmitted; the
//! `uuid` is the sole cross-site join key.
//!
//! # Void Markers
//!
//! Soft-delete and placeholder state lives inside the `fields` map
//! (`voided`, `void_reason`, `voided_by_ref`, `voided_at`) rather than as
//! dedicated columns. This keeps the digest of an incoming change directly
//! comparable with the digest of the local state, which is what the conflict
//! check relies on.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Void reason marking a record as a placeholder (stand-in for a row that
/// has not been synchronized yet).
pub const PLACEHOLDER_VOID_REASON: &str = "[placeholder]";

/// Sentinel value for mandatory string fields of a placeholder.
pub const DEFAULT_STRING: &str = "[Default]";

/// Void reason applied when a delete operation arrives from another site.
pub const DELETE_VOID_REASON: &str = "[Deleted at another site]";

/// Field name carrying the soft-delete flag.
pub const FIELD_VOIDED: &str = "voided";
/// Field name carrying the void reason.
pub const FIELD_VOID_REASON: &str = "void_reason";
/// Field name carrying the encoded reference to the voiding actor.
pub const FIELD_VOIDED_BY: &str = "voided_by_ref";
/// Field name carrying the void timestamp.
pub const FIELD_VOIDED_AT: &str = "voided_at";
/// Field name carrying the encoded reference to the creating actor.
pub const FIELD_CREATOR: &str = "creator_ref";
/// Field name carrying the encoded reference to the last editor.
pub const FIELD_CHANGED_BY: &str = "changed_by_ref";

/// Fixed epoch date used for placeholder timestamps.
pub fn default_date() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now)
}

/// Synchronization operation carried by a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    #[serde(rename = "c")]
    Create,
    #[serde(rename = "u")]
    Update,
    #[serde(rename = "d")]
    Delete,
}

impl SyncOperation {
    /// Parse the single-letter wire code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" | "C" => Some(SyncOperation::Create),
            "u" | "U" => Some(SyncOperation::Update),
            "d" | "D" => Some(SyncOperation::Delete),
            _ => None,
        }
    }

    /// The single-letter wire code.
    pub fn code(&self) -> &'static str {
        match self {
            SyncOperation::Create => "c",
            SyncOperation::Update => "u",
            SyncOperation::Delete => "d",
        }
    }
}

/// An incoming description of a create/update/delete to apply locally.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Record-kind tag (registry key), e.g. `"Person"`.
    pub kind: String,
    /// Globally unique identity, stable across sites. Immutable once assigned.
    pub uuid: String,
    /// Field name → value. Values whose field name ends in `_ref` are
    /// encoded cross-site references.
    pub fields: Map<String, Value>,
    /// What the source site did to the row.
    pub operation: SyncOperation,
    /// Identifier of the originating site.
    pub source_site_id: String,
    /// When the row was created at the source.
    pub created_at: DateTime<Utc>,
    /// When the row was last changed at the source, if ever.
    pub changed_at: Option<DateTime<Utc>>,
}

impl ChangeRecord {
    /// Create a change record with empty fields.
    pub fn new(
        kind: impl Into<String>,
        uuid: impl Into<String>,
        operation: SyncOperation,
        source_site_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            uuid: uuid.into(),
            fields: Map::new(),
            operation,
            source_site_id: source_site_id.into(),
            created_at: Utc::now(),
            changed_at: None,
        }
    }

    /// Set a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the creator reference field.
    pub fn with_creator_ref(self, reference: impl Into<String>) -> Self {
        self.with_field(FIELD_CREATOR, Value::String(reference.into()))
    }

    /// Encoded reference to the creating actor, if present.
    pub fn creator_ref(&self) -> Option<&str> {
        self.fields.get(FIELD_CREATOR).and_then(Value::as_str)
    }

    /// Encoded reference to the last editor, if present.
    pub fn changed_by_ref(&self) -> Option<&str> {
        self.fields.get(FIELD_CHANGED_BY).and_then(Value::as_str)
    }
}

/// Metadata block of the wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeMetadata {
    /// Wire operation code: `"c"`, `"u"` or `"d"`.
    pub operation: String,
    /// Identifier of the originating site. Older senders use the camelCase
    /// key.
    #[serde(alias = "sourceSiteId")]
    pub source_site_id: String,
}

/// Wire envelope for a change record.
///
/// ```json
/// {
///   "kind": "Person",
///   "record": { "uuid": "...", "created_at": "...", "gender": "F", ... },
///   "metadata": { "operation": "c", "source_site_id": "site-a" }
/// }
/// ```
///
/// The `record` map carries `uuid`, `created_at` and optional `changed_at`
/// alongside the domain fields; [`ChangeEnvelope::into_change_record`] lifts
/// those into the typed attributes and leaves the rest as fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    pub kind: String,
    pub record: Map<String, Value>,
    pub metadata: ChangeMetadata,
}

impl ChangeEnvelope {
    /// Convert the envelope into a typed [`ChangeRecord`].
    ///
    /// Fails if the operation code is unknown or `uuid` is missing.
    pub fn into_change_record(self) -> crate::error::Result<ChangeRecord> {
        let operation = SyncOperation::from_code(&self.metadata.operation).ok_or_else(|| {
            crate::error::SyncError::Internal(format!(
                "unknown operation code: {}",
                self.metadata.operation
            ))
        })?;

        let mut fields = self.record;
        let uuid = fields
            .remove("uuid")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                crate::error::SyncError::Internal("envelope record has no uuid".to_string())
            })?;
        let created_at = fields
            .remove("created_at")
            .and_then(|v| v.as_str().map(str::to_string))
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);
        let changed_at = fields
            .remove("changed_at")
            .and_then(|v| v.as_str().map(str::to_string))
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());

        Ok(ChangeRecord {
            kind: self.kind,
            uuid,
            fields,
            operation,
            source_site_id: self.metadata.source_site_id,
            created_at,
            changed_at,
        })
    }
}

/// The persisted representation of a synchronized row at the receiving site.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// Record-kind tag.
    pub kind: String,
    /// Storage-assigned numeric identity. `None` until first persisted.
    /// Never transmitted to other sites.
    pub id: Option<i64>,
    /// Cross-site identity.
    pub uuid: String,
    /// Mutable fields mirroring the change record, void markers included.
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub changed_at: Option<DateTime<Utc>>,
}

impl LocalRecord {
    /// Create an unpersisted record.
    pub fn new(kind: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            uuid: uuid.into(),
            fields: Map::new(),
            created_at: Utc::now(),
            changed_at: None,
        }
    }

    /// Whether the soft-delete flag is set.
    pub fn is_voided(&self) -> bool {
        self.fields
            .get(FIELD_VOIDED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The void reason, if any.
    pub fn void_reason(&self) -> Option<&str> {
        self.fields.get(FIELD_VOID_REASON).and_then(Value::as_str)
    }

    /// Whether this record is a placeholder materialized only to satisfy a
    /// reference, pending the real record's arrival.
    pub fn is_placeholder(&self) -> bool {
        self.is_voided() && self.void_reason() == Some(PLACEHOLDER_VOID_REASON)
    }

    /// Set the void markers for a delete merged from another site.
    pub fn set_void_markers(&mut self, reason: &str, voided_by_ref: Option<&str>) {
        self.fields
            .insert(FIELD_VOIDED.to_string(), Value::Bool(true));
        self.fields.insert(
            FIELD_VOID_REASON.to_string(),
            Value::String(reason.to_string()),
        );
        match voided_by_ref {
            Some(reference) => self.fields.insert(
                FIELD_VOIDED_BY.to_string(),
                Value::String(reference.to_string()),
            ),
            None => self.fields.insert(FIELD_VOIDED_BY.to_string(), Value::Null),
        };
        self.fields.insert(
            FIELD_VOIDED_AT.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
    }

    /// Clear placeholder/void markers (the real record has arrived unvoided).
    pub fn clear_void_markers(&mut self) {
        self.fields
            .insert(FIELD_VOIDED.to_string(), Value::Bool(false));
        self.fields.insert(FIELD_VOID_REASON.to_string(), Value::Null);
        self.fields.insert(FIELD_VOIDED_BY.to_string(), Value::Null);
        self.fields.insert(FIELD_VOIDED_AT.to_string(), Value::Null);
    }
}

/// Stored digest of the last successfully merged payload for a uuid.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHash {
    /// Record-kind tag (hash tables are per kind family).
    pub kind: String,
    /// Cross-site identity of the record this digest belongs to.
    pub uuid: String,
    /// Hex digest of the canonical payload.
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub changed_at: Option<DateTime<Utc>>,
}

impl RecordHash {
    /// Create a hash row for a freshly merged record.
    pub fn new(kind: impl Into<String>, uuid: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            uuid: uuid.into(),
            digest: digest.into(),
            created_at: Utc::now(),
            changed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_codes() {
        assert_eq!(SyncOperation::from_code("c"), Some(SyncOperation::Create));
        assert_eq!(SyncOperation::from_code("U"), Some(SyncOperation::Update));
        assert_eq!(SyncOperation::from_code("d"), Some(SyncOperation::Delete));
        assert_eq!(SyncOperation::from_code("x"), None);
        assert_eq!(SyncOperation::Delete.code(), "d");
    }

    #[test]
    fn test_change_record_builder() {
        let change = ChangeRecord::new("Person", "u1", SyncOperation::Create, "site-a")
            .with_field("gender", "F")
            .with_creator_ref("app.sync.User(c1)");
        assert_eq!(change.kind, "Person");
        assert_eq!(change.fields.get("gender"), Some(&json!("F")));
        assert_eq!(change.creator_ref(), Some("app.sync.User(c1)"));
        assert_eq!(change.changed_by_ref(), None);
    }

    #[test]
    fn test_local_record_void_markers() {
        let mut record = LocalRecord::new("User", "u1");
        assert!(!record.is_voided());
        assert!(!record.is_placeholder());

        record.set_void_markers(PLACEHOLDER_VOID_REASON, None);
        assert!(record.is_voided());
        assert!(record.is_placeholder());

        record.set_void_markers(DELETE_VOID_REASON, Some("app.sync.User(actor)"));
        assert!(record.is_voided());
        assert!(!record.is_placeholder());
        assert_eq!(record.void_reason(), Some(DELETE_VOID_REASON));

        record.clear_void_markers();
        assert!(!record.is_voided());
        assert_eq!(record.void_reason(), None);
    }

    #[test]
    fn test_envelope_parses_wire_payload() {
        let payload = json!({
            "kind": "Person",
            "record": {
                "uuid": "818b4ee6-8d68-4849-975d-80ab98016677",
                "created_at": "2019-05-28T13:42:31+00:00",
                "creator_ref": "app.sync.User(1cc6880e-4d46-11e4-9138-a6c5e4d20fb8)",
                "gender": "F",
                "voided": false
            },
            "metadata": { "operation": "c", "source_site_id": "site-a" }
        });

        let envelope: ChangeEnvelope = serde_json::from_value(payload).unwrap();
        let change = envelope.into_change_record().unwrap();

        assert_eq!(change.uuid, "818b4ee6-8d68-4849-975d-80ab98016677");
        assert_eq!(change.operation, SyncOperation::Create);
        assert_eq!(change.source_site_id, "site-a");
        assert!(change.creator_ref().unwrap().starts_with("app.sync.User("));
        // uuid and timestamps are lifted out of the fields map
        assert!(!change.fields.contains_key("uuid"));
        assert!(!change.fields.contains_key("created_at"));
        assert_eq!(change.fields.get("gender"), Some(&json!("F")));
    }

    #[test]
    fn test_envelope_rejects_unknown_operation() {
        let payload = json!({
            "kind": "Person",
            "record": { "uuid": "u1" },
            "metadata": { "operation": "z", "source_site_id": "site-a" }
        });
        let envelope: ChangeEnvelope = serde_json::from_value(payload).unwrap();
        assert!(envelope.into_change_record().is_err());
    }

    #[test]
    fn test_envelope_rejects_missing_uuid() {
        let payload = json!({
            "kind": "Person",
            "record": { "gender": "F" },
            "metadata": { "operation": "c", "source_site_id": "site-a" }
        });
        let envelope: ChangeEnvelope = serde_json::from_value(payload).unwrap();
        assert!(envelope.into_change_record().is_err());
    }

    #[test]
    fn test_default_date_is_epoch() {
        assert_eq!(default_date().timestamp(), 0);
    }
}
