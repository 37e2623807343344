//! Identifier translation protocol.
//!
//! Local numeric primary keys are meaningless across databases, so
//! foreign-key fields travel as encoded references:
//!
//! ```text
//! <fully-qualified-record-type>(<uuid>)
//! ```
//!
//! The sender encodes a local reference into this form; the receiver decodes
//! it back into a `(kind, uuid)` pair and hands that pair to the placeholder
//! resolver. Decoding never touches storage.
//!
//! Reference fields are identified by name: a field whose name ends in
//! `_ref` carries an encoded reference, never a plain scalar.

use crate::error::{Result, SyncError};
use crate::registry::KindRegistry;

/// Suffix marking a field as an encoded cross-site reference.
pub const REF_FIELD_SUFFIX: &str = "_ref";

/// Whether a field name follows the reference naming convention.
pub fn is_reference_field(field_name: &str) -> bool {
    field_name.ends_with(REF_FIELD_SUFFIX)
}

/// A decoded cross-site reference: the registry tag of the referenced kind
/// and the referenced record's uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReference {
    pub kind: String,
    pub uuid: String,
}

/// Encode a reference to a record of `kind` with the given uuid.
///
/// Uses the kind's qualified wire name from the registry. Case-sensitive.
pub fn encode(registry: &KindRegistry, kind: &str, uuid: &str) -> Result<String> {
    let spec = registry.get(kind)?;
    Ok(format!("{}({})", spec.qualified_name, uuid))
}

/// Decode an encoded reference string.
///
/// `field` is the field name carrying the value, used only for error
/// reporting. Fails with [`SyncError::MalformedReference`] when the value
/// does not match `"<type>(<uuid>)"` or the type is not registered.
pub fn decode(registry: &KindRegistry, field: &str, value: &str) -> Result<DecodedReference> {
    let open = value
        .find('(')
        .ok_or_else(|| SyncError::malformed_reference(field, value))?;
    if !value.ends_with(')') {
        return Err(SyncError::malformed_reference(field, value));
    }

    let qualified_name = &value[..open];
    let uuid = &value[open + 1..value.len() - 1];
    if qualified_name.is_empty() || uuid.is_empty() {
        return Err(SyncError::malformed_reference(field, value));
    }

    let spec = registry
        .resolve_qualified(qualified_name)
        .ok_or_else(|| SyncError::malformed_reference(field, value))?;

    Ok(DecodedReference {
        kind: spec.name.clone(),
        uuid: uuid.to_string(),
    })
}
