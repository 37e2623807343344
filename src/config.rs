//! Engine configuration.
//!
//! Deserialized from JSON (or built programmatically) and validated once at
//! startup. Every field has a default so a minimal deployment can start from
//! an empty document.

use crate::error::{Result, SyncError};
use crate::site::SiteInfo;
use serde::{Deserialize, Serialize};

fn default_separator() -> String {
    "^".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Separator appended between a site-scoped field value and its source
    /// site identifier. Reserved: must not occur in legitimate field values.
    #[serde(default = "default_separator")]
    pub site_separator: String,

    /// Kinds whose changes are acknowledged but never merged.
    #[serde(default)]
    pub excluded_kinds: Vec<String>,

    /// Remote sites expected to feed this engine.
    #[serde(default)]
    pub sites: Vec<SiteInfo>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            site_separator: default_separator(),
            excluded_kinds: Vec::new(),
            sites: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.site_separator.is_empty() {
            return Err(SyncError::Config(
                "site_separator must not be empty".to_string(),
            ));
        }
        for site in &self.sites {
            if site.id.is_empty() {
                return Err(SyncError::Config("site id must not be empty".to_string()));
            }
            if site.id.contains(&self.site_separator) {
                return Err(SyncError::Config(format!(
                    "site id '{}' contains the site separator '{}'",
                    site.id, self.site_separator
                )));
            }
        }
        Ok(())
    }

    /// Configuration suitable for unit and integration tests.
    pub fn for_testing() -> Self {
        Self {
            site_separator: default_separator(),
            excluded_kinds: Vec::new(),
            sites: vec![
                SiteInfo::new("site-a", "Site A"),
                SiteInfo::new("site-b", "Site B"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.site_separator, "^");
        assert!(config.excluded_kinds.is_empty());
        assert!(config.sites.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_full_document() {
        let config: SyncConfig = serde_json::from_str(
            r#"{
                "site_separator": "|",
                "excluded_kinds": ["AuditLog"],
                "sites": [{"id": "site-a", "name": "Clinic A"}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.site_separator, "|");
        assert_eq!(config.excluded_kinds, vec!["AuditLog"]);
        assert_eq!(config.sites[0].id, "site-a");
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_separator_is_rejected() {
        let config = SyncConfig {
            site_separator: String::new(),
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_site_id_containing_separator_is_rejected() {
        let config = SyncConfig {
            sites: vec![SiteInfo::new("site^a", "Bad")],
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
