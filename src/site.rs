//! Known remote sites.
//!
//! Site metadata is loaded once at startup (from configuration) and consulted
//! when qualifying site-scoped field values. The registry is deliberately
//! read-only after construction; sites do not appear and disappear mid-run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata for one remote site participating in replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    /// Stable identifier carried in every change record's `source_site_id`.
    pub id: String,
    /// Human-readable name, for logs only.
    #[serde(default)]
    pub name: String,
}

impl SiteInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Lookup table of known sites, keyed by site identifier.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: HashMap<String, SiteInfo>,
}

impl SiteRegistry {
    pub fn new(sites: impl IntoIterator<Item = SiteInfo>) -> Self {
        Self {
            sites: sites.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn get(&self, site_id: &str) -> Option<&SiteInfo> {
        self.sites.get(site_id)
    }

    pub fn contains(&self, site_id: &str) -> bool {
        self.sites.contains_key(site_id)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        let registry = SiteRegistry::new([
            SiteInfo::new("site-a", "Clinic A"),
            SiteInfo::new("site-b", "Clinic B"),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("site-a").unwrap().name, "Clinic A");
        assert!(registry.get("site-c").is_none());
    }

    #[test]
    fn test_empty_registry() {
        let registry = SiteRegistry::default();
        assert!(registry.is_empty());
        assert!(!registry.contains("site-a"));
    }
}
