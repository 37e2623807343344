//! Content digests for optimistic concurrency control.
//!
//! The stored digest of the last successfully merged payload is the anchor
//! the conflict check compares against. Digest computation must therefore be
//! stable across cosmetic payload differences:
//!
//! - **field-order-independent**: fields are sorted before hashing,
//! - **whitespace-insensitive**: string values are trimmed,
//! - **null-insensitive**: a field set to `null` hashes the same as an
//!   absent field (senders differ in whether they transmit empty columns),
//! - **unambiguous**: keys and string values are quoted with `"` and `\`
//!   escaped, so embedded delimiter characters cannot forge field
//!   boundaries and collide two distinct payloads.
//!
//! Nested objects and arrays are canonicalized recursively. The digest is a
//! hex-encoded MD5 of the canonical form; MD5 is retained for wire
//! compatibility with existing hash tables, not for adversarial integrity.

use md5::{Digest, Md5};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Compute the canonical digest for a record payload.
///
/// The uuid participates in the digest so two records with identical fields
/// but different identities never collide into the same anchor.
pub fn compute_digest(uuid: &str, fields: &Map<String, Value>) -> String {
    let mut canonical = String::with_capacity(64 + fields.len() * 16);
    canonical.push_str("uuid=");
    write_escaped(&mut canonical, uuid.trim());

    let sorted: BTreeMap<&String, &Value> = fields.iter().collect();
    for (name, value) in sorted {
        if value.is_null() {
            continue;
        }
        canonical.push(';');
        write_escaped(&mut canonical, name);
        canonical.push('=');
        write_canonical_value(&mut canonical, value);
    }

    let mut hasher = Md5::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Append a quoted string with `"` and `\` escaped. The quoting makes the
/// canonical form injective: a delimiter inside a key or value can never
/// read as a field boundary.
fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Append the canonical rendering of a value.
fn write_canonical_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(out, s.trim()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let mut first = true;
            for (name, nested) in sorted {
                if nested.is_null() {
                    continue;
                }
                if !first {
                    out.push(',');
                }
                first = false;
                write_escaped(out, name);
                out.push('=');
                write_canonical_value(out, nested);
            }
            out.push('}');
        }
    }
}
