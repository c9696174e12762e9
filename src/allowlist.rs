// ✅ Allowlist Manager - idempotent add / remove / list
//
// Adding a present address and removing an absent one are both no-ops,
// never errors.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::store::AllowStore;

#[derive(Clone)]
pub struct AllowlistManager {
    store: Arc<dyn AllowStore>,
}

impl AllowlistManager {
    pub fn new(store: Arc<dyn AllowStore>) -> Self {
        Self { store }
    }

    /// Add each address not already listed. Returns how many were new.
    pub fn add(&self, addresses: &[String]) -> Result<usize> {
        let mut added = 0;

        for address in addresses {
            if self.store.insert_allowed(address)?.is_inserted() {
                added += 1;
            }
        }

        debug!(requested = addresses.len(), added, "allowlist add");
        Ok(added)
    }

    /// Remove each listed address. Returns how many were actually removed.
    pub fn remove(&self, addresses: &[String]) -> Result<usize> {
        let mut removed = 0;

        for address in addresses {
            if self.store.delete_allowed(address)? {
                removed += 1;
            }
        }

        debug!(requested = addresses.len(), removed, "allowlist remove");
        Ok(removed)
    }

    /// Every allow-listed address, in the order it was added.
    pub fn list(&self) -> Result<Vec<String>> {
        self.store.allowed_addresses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::store::MemoryStore;

    fn ips(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_add_is_idempotent() {
        let manager = AllowlistManager::new(Arc::new(MemoryStore::new()));

        assert_eq!(manager.add(&ips(&["1.2.3.4"])).unwrap(), 1);
        assert_eq!(manager.add(&ips(&["1.2.3.4"])).unwrap(), 0);

        assert_eq!(manager.list().unwrap(), vec!["1.2.3.4"]);
    }

    #[test]
    fn test_add_with_repeats_in_one_request() {
        let manager = AllowlistManager::new(Arc::new(MemoryStore::new()));

        let added = manager
            .add(&ips(&["1.2.3.4", "5.6.7.8", "1.2.3.4"]))
            .unwrap();

        assert_eq!(added, 2);
        assert_eq!(manager.list().unwrap(), vec!["1.2.3.4", "5.6.7.8"]);
    }

    #[test]
    fn test_remove_absent_is_a_noop() {
        let manager = AllowlistManager::new(Arc::new(MemoryStore::new()));
        manager.add(&ips(&["1.2.3.4"])).unwrap();

        assert_eq!(manager.remove(&ips(&["9.9.9.9"])).unwrap(), 0);
        assert_eq!(manager.list().unwrap(), vec!["1.2.3.4"]);

        assert_eq!(manager.remove(&ips(&["1.2.3.4", "9.9.9.9"])).unwrap(), 1);
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_backed_manager() {
        let manager = AllowlistManager::new(Arc::new(SqliteStore::open_in_memory().unwrap()));

        manager.add(&ips(&["1.2.3.4", "5.6.7.8"])).unwrap();
        manager.add(&ips(&["5.6.7.8"])).unwrap();
        manager.remove(&ips(&["1.2.3.4"])).unwrap();

        assert_eq!(manager.list().unwrap(), vec!["5.6.7.8"]);
    }
}
