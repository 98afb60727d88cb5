use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{derive_path, ArtifactStore, Namespace, PathHint, StoreError};
use crate::model::ArtifactRecord;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    media_type: String,
}

/// In-process artifact store for tests and embedding. Fetch URLs use the `mem://` scheme.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.lock().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }

    pub async fn media_type(&self, path: &str) -> Option<String> {
        self.objects
            .lock()
            .await
            .get(path)
            .map(|o| o.media_type.clone())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        bytes: &[u8],
        media_type: &str,
        hint: &PathHint,
    ) -> Result<ArtifactRecord, StoreError> {
        let path = derive_path(hint, Utc::now());
        let object = StoredObject {
            bytes: bytes.to_vec(),
            media_type: media_type.to_string(),
        };
        self.objects.lock().await.insert(path.clone(), object);
        Ok(ArtifactRecord {
            fetch_url: format!("mem://{path}"),
            path,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.objects.lock().await.remove(path);
        Ok(())
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .await
            .get(path)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|path| Namespace::of(path) == Some(namespace))
            .cloned()
            .collect())
    }
}
