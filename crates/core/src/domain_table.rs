/// Operator-registered zone aliases, shared by every session of the process

use std::sync::Arc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDomain {
    pub alias: String,
    pub zone: String,
    pub added_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct CustomDomainTable {
    // lowercase alias -> zone
    store: Arc<DashMap<String, CustomDomain>>,
}

impl CustomDomainTable {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Register (or replace) a zone under an alias
    pub fn insert(&self, alias: &str, zone: &str) {
        let key = alias.trim().to_lowercase();
        let stored = CustomDomain {
            alias: key.clone(),
            zone: zone.trim().trim_end_matches('.').to_lowercase(),
            added_at: chrono::Utc::now(),
        };

        debug!(alias = %key, zone = %stored.zone, "registered custom domain");
        self.store.insert(key, stored);
    }

    /// Zone for an alias, matched case-insensitively
    pub fn get(&self, alias: &str) -> Option<String> {
        self.store
            .get(&alias.trim().to_lowercase())
            .map(|entry| entry.value().zone.clone())
    }

    pub fn remove(&self, alias: &str) -> bool {
        self.store.remove(&alias.trim().to_lowercase()).is_some()
    }

    /// Snapshot sorted by alias
    pub fn entries(&self) -> Vec<CustomDomain> {
        let mut entries: Vec<CustomDomain> =
            self.store.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| a.alias.cmp(&b.alias));
        entries
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for CustomDomainTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        let table = CustomDomainTable::new();
        table.insert("Work", "Example.org.");

        assert_eq!(table.get("work").as_deref(), Some("example.org"));
        assert_eq!(table.get("WORK").as_deref(), Some("example.org"));
        assert_eq!(table.get("home"), None);
    }

    #[test]
    fn test_insert_replaces_and_entries_sorted() {
        let table = CustomDomainTable::new();
        table.insert("zeta", "z.net");
        table.insert("alpha", "a.net");
        table.insert("ALPHA", "b.net");

        let entries = table.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].alias, "alpha");
        assert_eq!(entries[0].zone, "b.net");
        assert!(table.remove("Zeta"));
        assert_eq!(table.len(), 1);
    }
}
