//! Site-scoped field normalization.
//!
//! Some fields are only unique per originating site (a username, a provider
//! identifier). Before merging, each such value is qualified with the source
//! site identifier so rows from different sites cannot collide:
//!
//! ```text
//! "jdoe"  +  source site "site-a"  →  "jdoe^site-a"
//! ```
//!
//! The separator is reserved; it must not appear in legitimate field values,
//! which also makes normalization idempotent (an already-qualified value is
//! left alone).

use crate::model::ChangeRecord;
use crate::registry::KindSpec;
use crate::site::SiteRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SiteNormalizer {
    separator: String,
    sites: Arc<SiteRegistry>,
}

impl SiteNormalizer {
    pub fn new(separator: impl Into<String>, sites: Arc<SiteRegistry>) -> Self {
        Self {
            separator: separator.into(),
            sites,
        }
    }

    /// Qualify the configured site-scoped fields of `change` in place.
    ///
    /// Absent, null, or empty values are skipped. Unknown source sites are
    /// tolerated; the raw site identifier is used as the qualifier either
    /// way, but a warning is emitted so misconfiguration is visible.
    pub fn normalize(&self, spec: &KindSpec, change: &mut ChangeRecord) {
        if spec.site_scoped_fields.is_empty() {
            return;
        }

        if !self.sites.contains(&change.source_site_id) {
            warn!(
                site = %change.source_site_id,
                kind = %change.kind,
                "Change originates from a site missing from the site registry"
            );
        }

        for field in &spec.site_scoped_fields {
            let Some(Value::String(value)) = change.fields.get(field) else {
                continue;
            };
            if value.is_empty() || value.contains(&self.separator) {
                continue;
            }
            let qualified = format!("{}{}{}", value, self.separator, change.source_site_id);
            debug!(
                kind = %change.kind,
                uuid = %change.uuid,
                field = %field,
                "Qualified site-scoped field"
            );
            change
                .fields
                .insert(field.clone(), Value::String(qualified));
        }
    }
}
