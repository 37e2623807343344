//! Static record-kind registry.
//!
//! Every synchronized record kind is registered once at startup with:
//!
//! - its **qualified wire name**, used by the identifier translation
//!   protocol (`"app.sync.Provider(p1)"`),
//! - an optional **base kind** for joined-table subtypes (an extension kind
//!   stores its rows in a second table keyed by the base table's identity),
//! - the **site-scoped fields** the normalizer must qualify,
//! - the **placeholder defaults**: minimal mandatory field values used when
//!   a stand-in record has to be materialized.
//!
//! The registry replaces runtime type dispatch: the merge engine and the
//! placeholder resolver look relations up here instead of inspecting types.

use crate::error::{Result, SyncError};
use crate::model::DEFAULT_STRING;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Reserved uuid prefix for well-known singleton placeholders.
const SINGLETON_UUID_PREFIX: &str = "placeholder_";

/// Registration entry for one record kind.
#[derive(Debug, Clone)]
pub struct KindSpec {
    /// Registry key, e.g. `"Person"`.
    pub name: String,
    /// Fully qualified wire name, e.g. `"app.sync.Person"`.
    pub qualified_name: String,
    /// Base kind whose table identity this kind shares, if any.
    pub base: Option<String>,
    /// Fields whose values are only unique per site and must be qualified.
    pub site_scoped_fields: Vec<String>,
    /// Mandatory field values for a placeholder of this kind.
    pub placeholder_defaults: Map<String, Value>,
}

impl KindSpec {
    /// Create a spec with no base kind, no site-scoped fields and no
    /// placeholder defaults.
    pub fn new(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            base: None,
            site_scoped_fields: Vec::new(),
            placeholder_defaults: Map::new(),
        }
    }

    /// Declare this kind a storage extension of `base` (shared identity).
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Declare fields that must be site-qualified by the normalizer.
    pub fn with_site_scoped_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.site_scoped_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add a mandatory placeholder default field value.
    pub fn with_placeholder_default(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.placeholder_defaults.insert(field.into(), value.into());
        self
    }

    /// The deterministic reserved uuid for this kind's singleton placeholder.
    pub fn singleton_uuid(&self) -> String {
        format!("{}{}", SINGLETON_UUID_PREFIX, to_snake_case(&self.name))
    }
}

/// Registry mapping record-kind tags to their specs, resolved once at
/// startup. No hidden global state; construct it and pass it in.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<String, KindSpec>,
    by_qualified: HashMap<String, String>,
}

impl KindRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the standard kind set.
    ///
    /// `Patient` is a joined-table extension of `Person`; `User` and
    /// `Provider` carry site-scoped identity fields.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            KindSpec::new("Person", "app.sync.Person")
                .with_placeholder_default("gender", DEFAULT_STRING),
        );
        registry.register(KindSpec::new("Patient", "app.sync.Patient").with_base("Person"));
        registry.register(
            KindSpec::new("User", "app.sync.User")
                .with_site_scoped_fields(["username", "system_id"])
                .with_placeholder_default("username", DEFAULT_STRING),
        );
        registry.register(
            KindSpec::new("Provider", "app.sync.Provider")
                .with_site_scoped_fields(["identifier"])
                .with_placeholder_default("name", DEFAULT_STRING),
        );
        registry.register(
            KindSpec::new("Location", "app.sync.Location")
                .with_placeholder_default("name", DEFAULT_STRING),
        );
        registry
    }

    /// Register a kind, replacing any previous spec with the same name.
    pub fn register(&mut self, spec: KindSpec) {
        self.by_qualified
            .insert(spec.qualified_name.clone(), spec.name.clone());
        self.kinds.insert(spec.name.clone(), spec);
    }

    /// Look up a kind by tag.
    pub fn get(&self, kind: &str) -> Result<&KindSpec> {
        self.kinds
            .get(kind)
            .ok_or_else(|| SyncError::UnresolvedKind(kind.to_string()))
    }

    /// Whether a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Resolve a qualified wire name back to its kind spec.
    pub fn resolve_qualified(&self, qualified_name: &str) -> Option<&KindSpec> {
        self.by_qualified
            .get(qualified_name)
            .and_then(|name| self.kinds.get(name))
    }

    /// The base kind this kind shares identity with, if any.
    pub fn base_of(&self, kind: &str) -> Result<Option<&KindSpec>> {
        let spec = self.get(kind)?;
        match &spec.base {
            Some(base) => Ok(Some(self.get(base)?)),
            None => Ok(None),
        }
    }

}

/// Convert a CamelCase kind name to snake_case.
fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
