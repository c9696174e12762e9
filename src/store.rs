// 🗃️ Store Abstraction - records, store traits, in-memory implementation
//
// Every component receives its store as an injected `Arc<dyn ...>` handle.
// SQLite lives in db.rs; MemoryStore below backs tests and dry runs.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// ============================================================================
// RECORDS
// ============================================================================

/// One ingested exit-node address.
///
/// Created once by the ingestion pipeline and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Surrogate id assigned by the store (insertion order)
    pub id: i64,

    #[serde(rename = "ip_address")]
    pub address: String,

    #[serde(rename = "country")]
    pub country_code: String,

    /// Snapshot time of the cycle that created this record
    #[serde(rename = "timestamp")]
    pub ingested_at: DateTime<Utc>,
}

/// Record as handed to the store, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddressRecord {
    pub address: String,
    pub country_code: String,
    pub ingested_at: DateTime<Utc>,
}

/// Result of an insert against a unique address column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// The address was already present; nothing was written.
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

// ============================================================================
// RECORD FILTER
// ============================================================================

/// Field and time-range predicates a store can push down.
///
/// Both time bounds are exclusive. Allow-list exclusion and pagination are
/// applied by the query engine, not the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub country: Option<String>,
    pub ingested_after: Option<DateTime<Utc>>,
    pub ingested_before: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn matches(&self, record: &AddressRecord) -> bool {
        if let Some(country) = &self.country {
            if &record.country_code != country {
                return false;
            }
        }

        if let Some(after) = self.ingested_after {
            if record.ingested_at <= after {
                return false;
            }
        }

        if let Some(before) = self.ingested_before {
            if record.ingested_at >= before {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// STORE TRAITS
// ============================================================================

/// Durable keyed store of address records, unique on address.
pub trait AddressStore: Send + Sync {
    fn contains_address(&self, address: &str) -> Result<bool>;

    /// Insert a record. A uniqueness conflict yields `InsertOutcome::Duplicate`,
    /// never a second row.
    fn insert_address(&self, record: &NewAddressRecord) -> Result<InsertOutcome>;

    /// Records matching `filter`, ascending by id.
    fn find_addresses(&self, filter: &RecordFilter) -> Result<Vec<AddressRecord>>;

    fn count_addresses(&self) -> Result<i64>;
}

/// Durable set of allow-listed (excluded) address values.
pub trait AllowStore: Send + Sync {
    fn insert_allowed(&self, address: &str) -> Result<InsertOutcome>;

    /// Returns false when the address was not present.
    fn delete_allowed(&self, address: &str) -> Result<bool>;

    /// All allow-listed addresses, ascending by id.
    fn allowed_addresses(&self) -> Result<Vec<String>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Default)]
struct MemoryTables {
    records: Vec<AddressRecord>,
    allowed: Vec<(i64, String)>,
    next_record_id: i64,
    next_allow_id: i64,
}

/// Both stores in process memory. Check-and-insert happens under one lock,
/// so uniqueness holds for concurrent callers too.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl AddressStore for MemoryStore {
    fn contains_address(&self, address: &str) -> Result<bool> {
        Ok(self.lock()?.records.iter().any(|r| r.address == address))
    }

    fn insert_address(&self, record: &NewAddressRecord) -> Result<InsertOutcome> {
        let mut tables = self.lock()?;

        if tables.records.iter().any(|r| r.address == record.address) {
            return Ok(InsertOutcome::Duplicate);
        }

        tables.next_record_id += 1;
        let id = tables.next_record_id;
        tables.records.push(AddressRecord {
            id,
            address: record.address.clone(),
            country_code: record.country_code.clone(),
            ingested_at: record.ingested_at,
        });

        Ok(InsertOutcome::Inserted(id))
    }

    fn find_addresses(&self, filter: &RecordFilter) -> Result<Vec<AddressRecord>> {
        // Records are appended with increasing ids, so Vec order is id order
        Ok(self
            .lock()?
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn count_addresses(&self) -> Result<i64> {
        Ok(self.lock()?.records.len() as i64)
    }
}

impl AllowStore for MemoryStore {
    fn insert_allowed(&self, address: &str) -> Result<InsertOutcome> {
        let mut tables = self.lock()?;

        if tables.allowed.iter().any(|(_, a)| a == address) {
            return Ok(InsertOutcome::Duplicate);
        }

        tables.next_allow_id += 1;
        let id = tables.next_allow_id;
        tables.allowed.push((id, address.to_string()));

        Ok(InsertOutcome::Inserted(id))
    }

    fn delete_allowed(&self, address: &str) -> Result<bool> {
        let mut tables = self.lock()?;
        let before = tables.allowed.len();
        tables.allowed.retain(|(_, a)| a != address);
        Ok(tables.allowed.len() != before)
    }

    fn allowed_addresses(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .allowed
            .iter()
            .map(|(_, a)| a.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_record(address: &str, country: &str, hour: u32) -> NewAddressRecord {
        NewAddressRecord {
            address: address.to_string(),
            country_code: country.to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 2, 12, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_memory_store_rejects_duplicate_address() {
        let store = MemoryStore::new();

        let first = store.insert_address(&new_record("1.2.3.4", "US", 1)).unwrap();
        let second = store.insert_address(&new_record("1.2.3.4", "DE", 2)).unwrap();

        assert_eq!(first, InsertOutcome::Inserted(1));
        assert_eq!(second, InsertOutcome::Duplicate);
        assert_eq!(store.count_addresses().unwrap(), 1);

        // Country is set once and never overwritten
        let all = store.find_addresses(&RecordFilter::default()).unwrap();
        assert_eq!(all[0].country_code, "US");
    }

    #[test]
    fn test_record_filter_bounds_are_exclusive() {
        let record = AddressRecord {
            id: 1,
            address: "1.2.3.4".to_string(),
            country_code: "US".to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 2, 12, 6, 0, 0).unwrap(),
        };

        let at = record.ingested_at;
        let after = RecordFilter {
            ingested_after: Some(at),
            ..Default::default()
        };
        let before = RecordFilter {
            ingested_before: Some(at),
            ..Default::default()
        };

        assert!(!after.matches(&record));
        assert!(!before.matches(&record));
        assert!(RecordFilter::default().matches(&record));
    }

    #[test]
    fn test_record_filter_country_is_case_sensitive() {
        let record = AddressRecord {
            id: 1,
            address: "1.2.3.4".to_string(),
            country_code: "US".to_string(),
            ingested_at: Utc::now(),
        };
        let lower = RecordFilter {
            country: Some("us".to_string()),
            ..Default::default()
        };

        assert!(!lower.matches(&record));
    }

    #[test]
    fn test_memory_allow_store_idempotent() {
        let store = MemoryStore::new();

        assert!(store.insert_allowed("1.2.3.4").unwrap().is_inserted());
        assert_eq!(
            store.insert_allowed("1.2.3.4").unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.allowed_addresses().unwrap(), vec!["1.2.3.4"]);

        assert!(store.delete_allowed("1.2.3.4").unwrap());
        assert!(!store.delete_allowed("1.2.3.4").unwrap());
        assert!(store.allowed_addresses().unwrap().is_empty());
    }

    #[test]
    fn test_record_serializes_with_wire_names() {
        let record = AddressRecord {
            id: 7,
            address: "1.2.3.4".to_string(),
            country_code: "US".to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 2, 12, 0, 0, 0).unwrap(),
        };

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["ip_address"], "1.2.3.4");
        assert_eq!(json["country"], "US");
        assert_eq!(json["timestamp"], "2024-02-12T00:00:00Z");
    }
}
