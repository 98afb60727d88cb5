//! Biometric index: named collections of face templates with similarity search.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use facetrack_vision::VisionError;
use log::{debug, info};
use thiserror::Error;

use crate::model::{BiometricTemplate, MatchCandidate};
use crate::store::StoreError;

pub mod local;

pub use self::local::LocalBiometricIndex;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("invalid collection id '{0}'")]
    InvalidCollection(String),

    #[error("no usable face in {path}: {source}")]
    UnusableImage {
        path: String,
        #[source]
        source: VisionError,
    },

    #[error("template correlation id {actual} does not match artifact {expected}")]
    CorrelationMismatch { expected: String, actual: String },

    #[error("could not read artifact: {0}")]
    Artifact(#[from] StoreError),

    #[error("index storage error at {path}: {message}")]
    Storage { path: PathBuf, message: String },

    #[error("biometric index call timed out after {0:?}")]
    Timeout(Duration),

    #[error("biometric index unavailable: {0}")]
    Unavailable(String),
}

impl IndexError {
    /// The image itself was the problem; capturing again may succeed.
    pub fn is_unusable_image(&self) -> bool {
        matches!(self, IndexError::UnusableImage { .. })
    }
}

/// Collection ids follow the usual hosted-index rule: `[A-Za-z0-9_.-]+`
pub fn validate_collection_id(collection_id: &str) -> Result<(), IndexError> {
    let ok = !collection_id.is_empty()
        && collection_id.len() <= 255
        && collection_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if ok {
        Ok(())
    } else {
        Err(IndexError::InvalidCollection(collection_id.to_string()))
    }
}

/// Keep candidates at or above `similarity_floor`, best first, at most `max_candidates`.
pub fn rank_candidates(
    candidates: impl IntoIterator<Item = MatchCandidate>,
    max_candidates: usize,
    similarity_floor: f32,
) -> Vec<MatchCandidate> {
    let mut kept: Vec<MatchCandidate> = candidates
        .into_iter()
        .filter(|c| c.similarity >= similarity_floor)
        .collect();
    kept.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    kept.truncate(max_candidates);
    kept
}

#[async_trait]
pub trait BiometricIndex: Send + Sync {
    async fn collection_exists(&self, collection_id: &str) -> Result<bool, IndexError>;

    /// Create a collection. Fails with [`IndexError::CollectionExists`] if it is already there.
    async fn create_collection(&self, collection_id: &str) -> Result<(), IndexError>;

    /// Create the collection if absent.
    ///
    /// Losing a creation race to another caller counts as success, so concurrent
    /// first-time callers never fail each other.
    async fn ensure_collection(&self, collection_id: &str) -> Result<(), IndexError> {
        if self.collection_exists(collection_id).await? {
            debug!("collection {} already exists", collection_id);
            return Ok(());
        }
        match self.create_collection(collection_id).await {
            Ok(()) => {
                info!("collection {} created", collection_id);
                Ok(())
            }
            Err(IndexError::CollectionExists(_)) => {
                debug!("collection {} was created concurrently", collection_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Derive a template from the image at `artifact_path`.
    /// The template's correlation id is `artifact_path`.
    async fn enroll(
        &self,
        artifact_path: &str,
        collection_id: &str,
    ) -> Result<BiometricTemplate, IndexError>;

    /// Best matches for the probe image, highest similarity first.
    /// Empty when nothing reaches `similarity_floor`.
    async fn search(
        &self,
        probe_path: &str,
        collection_id: &str,
        max_candidates: usize,
        similarity_floor: f32,
    ) -> Result<Vec<MatchCandidate>, IndexError>;

    async fn list_templates(&self, collection_id: &str)
        -> Result<Vec<BiometricTemplate>, IndexError>;
}
