use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ProfileRegistry, RegistryError};
use crate::model::ProfileRecord;

#[derive(Debug, Default)]
pub struct MemoryProfileRegistry {
    records: Mutex<Vec<ProfileRecord>>,
}

impl MemoryProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl ProfileRegistry for MemoryProfileRegistry {
    async fn insert(&self, record: ProfileRecord) -> Result<(), RegistryError> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ProfileRecord>, RegistryError> {
        Ok(self.records.lock().await.clone())
    }
}
