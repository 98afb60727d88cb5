use std::collections::HashMap;
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use facetrack_vision::{similarity_percent, Embedding, Pipeline};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{rank_candidates, validate_collection_id, BiometricIndex, IndexError};
use crate::model::{BiometricTemplate, MatchCandidate};
use crate::store::ArtifactStore;

const TEMPLATES_FILE: &str = "templates.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemplateRecord {
    template_id: String,
    correlation_id: String,
    embedding: Vec<f32>,
}

type Collections = HashMap<String, Vec<TemplateRecord>>;

/// Biometric index computed locally with the vision pipeline.
///
/// Images are dereferenced through the artifact store by path, the same way a hosted
/// index reads from a bucket. With a root directory each collection persists as
/// `<root>/<collection>/templates.bin` (postcard); without one it lives in memory.
pub struct LocalBiometricIndex {
    artifacts: Arc<dyn ArtifactStore>,
    pipeline: Pipeline,
    root: Option<PathBuf>,
    collections: Mutex<Collections>,
}

impl LocalBiometricIndex {
    pub fn in_memory(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            artifacts,
            pipeline: Pipeline::new(),
            root: None,
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn open(root: impl Into<PathBuf>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::in_memory(artifacts)
        }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    fn collection_dir(&self, collection_id: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(collection_id))
    }

    /// Pull a collection from disk into the cache if needed. Returns whether it exists.
    async fn load(
        &self,
        collections: &mut Collections,
        collection_id: &str,
    ) -> Result<bool, IndexError> {
        if collections.contains_key(collection_id) {
            return Ok(true);
        }
        let Some(dir) = self.collection_dir(collection_id) else {
            return Ok(false);
        };

        let file = dir.join(TEMPLATES_FILE);
        let records = match tokio::fs::read(&file).await {
            Ok(data) => postcard::from_bytes(&data).map_err(|e| storage_error(&file, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Directory created but the empty template file never written
                let exists = tokio::fs::try_exists(&dir)
                    .await
                    .map_err(|e| storage_error(&dir, e))?;
                if !exists {
                    return Ok(false);
                }
                Vec::new()
            }
            Err(e) => return Err(storage_error(&file, e)),
        };

        collections.insert(collection_id.to_string(), records);
        Ok(true)
    }

    async fn persist(
        &self,
        collection_id: &str,
        records: &[TemplateRecord],
    ) -> Result<(), IndexError> {
        let Some(dir) = self.collection_dir(collection_id) else {
            return Ok(());
        };
        let file = dir.join(TEMPLATES_FILE);
        let data = postcard::to_allocvec(records).map_err(|e| storage_error(&file, e))?;
        // Readers in other processes must never see a half-written file
        let staging = dir.join(format!("{TEMPLATES_FILE}.{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&staging, data)
            .await
            .map_err(|e| storage_error(&staging, e))?;
        tokio::fs::rename(&staging, &file)
            .await
            .map_err(|e| storage_error(&file, e))
    }

    async fn require(&self, collection_id: &str) -> Result<(), IndexError> {
        validate_collection_id(collection_id)?;
        let mut collections = self.collections.lock().await;
        if self.load(&mut collections, collection_id).await? {
            Ok(())
        } else {
            Err(IndexError::CollectionNotFound(collection_id.to_string()))
        }
    }

    async fn embed(&self, path: &str) -> Result<Embedding, IndexError> {
        let bytes = self.artifacts.fetch(path).await?;
        let pipeline = self.pipeline.clone();
        let extracted = tokio::task::spawn_blocking(move || pipeline.extract_embedding(&bytes))
            .await
            .map_err(|e| IndexError::Unavailable(format!("template extraction aborted: {e}")))?;
        extracted.map_err(|source| IndexError::UnusableImage {
            path: path.to_string(),
            source,
        })
    }
}

fn storage_error(path: &Path, err: impl Display) -> IndexError {
    IndexError::Storage {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[async_trait]
impl BiometricIndex for LocalBiometricIndex {
    async fn collection_exists(&self, collection_id: &str) -> Result<bool, IndexError> {
        validate_collection_id(collection_id)?;
        let mut collections = self.collections.lock().await;
        self.load(&mut collections, collection_id).await
    }

    async fn create_collection(&self, collection_id: &str) -> Result<(), IndexError> {
        validate_collection_id(collection_id)?;
        let mut collections = self.collections.lock().await;
        if self.load(&mut collections, collection_id).await? {
            return Err(IndexError::CollectionExists(collection_id.to_string()));
        }

        if let (Some(root), Some(dir)) = (&self.root, self.collection_dir(collection_id)) {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| storage_error(root, e))?;
            // Another process may win the same race; create_dir is the arbiter
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    return Err(IndexError::CollectionExists(collection_id.to_string()));
                }
                Err(e) => return Err(storage_error(&dir, e)),
            }
            self.persist(collection_id, &[]).await?;
        }

        collections.insert(collection_id.to_string(), Vec::new());
        Ok(())
    }

    async fn enroll(
        &self,
        artifact_path: &str,
        collection_id: &str,
    ) -> Result<BiometricTemplate, IndexError> {
        self.require(collection_id).await?;
        let embedding = self.embed(artifact_path).await?;

        let mut collections = self.collections.lock().await;
        self.load(&mut collections, collection_id).await?;
        let records = collections
            .get_mut(collection_id)
            .ok_or_else(|| IndexError::CollectionNotFound(collection_id.to_string()))?;

        let record = TemplateRecord {
            template_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: artifact_path.to_string(),
            embedding: embedding.to_vec(),
        };
        records.push(record.clone());
        if let Err(e) = self.persist(collection_id, records).await {
            records.pop();
            return Err(e);
        }

        debug!(
            "template {} enrolled in {} for {}",
            record.template_id, collection_id, artifact_path
        );
        Ok(BiometricTemplate {
            template_id: record.template_id,
            correlation_id: record.correlation_id,
        })
    }

    async fn search(
        &self,
        probe_path: &str,
        collection_id: &str,
        max_candidates: usize,
        similarity_floor: f32,
    ) -> Result<Vec<MatchCandidate>, IndexError> {
        self.require(collection_id).await?;
        let probe = self.embed(probe_path).await?;

        let mut collections = self.collections.lock().await;
        self.load(&mut collections, collection_id).await?;
        let records = collections
            .get(collection_id)
            .ok_or_else(|| IndexError::CollectionNotFound(collection_id.to_string()))?;

        let scored = records.iter().map(|r| MatchCandidate {
            correlation_id: r.correlation_id.clone(),
            similarity: similarity_percent(&probe, &Embedding::from_stored(&r.embedding)),
        });
        let ranked = rank_candidates(scored, max_candidates, similarity_floor);

        debug!(
            "search in {} over {} template(s): {} candidate(s) >= {:.1}",
            collection_id,
            records.len(),
            ranked.len(),
            similarity_floor
        );
        Ok(ranked)
    }

    async fn list_templates(
        &self,
        collection_id: &str,
    ) -> Result<Vec<BiometricTemplate>, IndexError> {
        self.require(collection_id).await?;
        let collections = self.collections.lock().await;
        let records = collections
            .get(collection_id)
            .ok_or_else(|| IndexError::CollectionNotFound(collection_id.to_string()))?;
        Ok(records
            .iter()
            .map(|r| BiometricTemplate {
                template_id: r.template_id.clone(),
                correlation_id: r.correlation_id.clone(),
            })
            .collect())
    }
}
