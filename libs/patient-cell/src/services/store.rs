// libs/patient-cell/src/services/store.rs
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::PatientRecord;

/// Backing store for patient records. The matcher only needs full-table
/// iteration plus append; the storage format behind it is not part of the
/// contract.
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<PatientRecord>>;
    async fn append(&self, record: PatientRecord) -> Result<Uuid>;
}

pub struct InMemoryPatientStore {
    records: RwLock<Vec<PatientRecord>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn seeded(records: Vec<PatientRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load records from a JSON file. A missing or malformed file yields an
    /// empty store: availability of history is an optimization, not a
    /// requirement.
    pub fn load_from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<PatientRecord>>(&contents) {
                Ok(records) => {
                    debug!("Loaded {} patient records from {}", records.len(), path.display());
                    Self::seeded(records)
                }
                Err(e) => {
                    warn!("Malformed patient store at {}: {}", path.display(), e);
                    Self::new()
                }
            },
            Err(_) => {
                warn!("Patient store not found at {}", path.display());
                Self::new()
            }
        }
    }
}

impl Default for InMemoryPatientStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientStore for InMemoryPatientStore {
    async fn find_all(&self) -> Result<Vec<PatientRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn append(&self, record: PatientRecord) -> Result<Uuid> {
        let id = record.id;
        self.records.write().await.push(record);
        debug!("Appended patient record {}", id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientType;
    use std::io::Write;

    fn sample_record(name: &str) -> PatientRecord {
        PatientRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            date_of_birth: "01/15/1985".to_string(),
            phone: "5551234567".to_string(),
            email: None,
            patient_type: PatientType::Returning,
            last_visit: Some("03/11/2025".to_string()),
            insurance_carrier: None,
            member_id: None,
            group_number: None,
        }
    }

    #[tokio::test]
    async fn append_then_find_all() {
        let store = InMemoryPatientStore::new();
        let id = store.append(sample_record("John Smith")).await.unwrap();

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
    }

    #[tokio::test]
    async fn missing_file_yields_empty_store() {
        let store = InMemoryPatientStore::load_from_file("/nonexistent/patients.json");
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_file_yields_empty_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json at all").unwrap();

        let store = InMemoryPatientStore::load_from_file(file.path());
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let records = vec![sample_record("Jane Doe")];
        write!(file, "{}", serde_json::to_string(&records).unwrap()).unwrap();

        let store = InMemoryPatientStore::load_from_file(file.path());
        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Jane Doe");
    }
}
