//! Login flow: upload a probe, search for its face, resolve the match to a profile.
//!
//! Once the probe is stored, the cleanup step deletes it exactly once whichever way the
//! attempt ends. Cleanup failures are logged and never change the verdict.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::deadline::{bounded, DEFAULT_CALL_TIMEOUT};
use crate::error::{FlowError, SearchFailure};
use crate::index::{BiometricIndex, IndexError};
use crate::model::{ArtifactRecord, CapturedImage, ProfileRecord};
use crate::registry::{ProfileRegistry, RegistryError};
use crate::store::{ArtifactStore, PathHint, StoreError};

/// Minimum similarity (0-100) for a login match
pub const SIMILARITY_FLOOR: f32 = 90.0;

/// Only the best match is considered
pub const MAX_CANDIDATES: usize = 1;

const PROBE_FILE_NAME: &str = "face.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    AwaitingInput,
    Uploading,
    Searching,
    Resolving,
    Cleanup,
    Accepted,
    Rejected,
    Failed,
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifyStage::AwaitingInput => "awaiting-input",
            VerifyStage::Uploading => "uploading",
            VerifyStage::Searching => "searching",
            VerifyStage::Resolving => "resolving",
            VerifyStage::Cleanup => "cleanup",
            VerifyStage::Accepted => "accepted",
            VerifyStage::Rejected => "rejected",
            VerifyStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(stage: VerifyStage) {
    debug!("verify: -> {}", stage);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The probe image had no usable face
    NoFace,
    /// Nothing enrolled reached the similarity floor
    NoMatch,
    /// The index matched a template but no profile carries its correlation id
    UnknownProfile {
        correlation_id: String,
        similarity: f32,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoFace => f.write_str("no face detected in the captured image"),
            Rejection::NoMatch => f.write_str("no matching face found"),
            Rejection::UnknownProfile { .. } => f.write_str("face recognized but no profile found"),
        }
    }
}

/// Result of a verification attempt that ran to completion
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(ProfileRecord),
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    pub fn profile(&self) -> Option<&ProfileRecord> {
        match self {
            Verdict::Accepted(profile) => Some(profile),
            Verdict::Rejected(_) => None,
        }
    }
}

pub struct Verifier {
    artifacts: Arc<dyn ArtifactStore>,
    index: Arc<dyn BiometricIndex>,
    registry: Arc<dyn ProfileRegistry>,
    collection_id: String,
    call_timeout: Duration,
}

impl Verifier {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        index: Arc<dyn BiometricIndex>,
        registry: Arc<dyn ProfileRegistry>,
        collection_id: impl Into<String>,
    ) -> Self {
        Self {
            artifacts,
            index,
            registry,
            collection_id: collection_id.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Decide whether the captured face belongs to an enrolled profile.
    ///
    /// `Err` is reserved for invalid input and transport failures; a face that simply
    /// isn't recognized is `Ok(Verdict::Rejected(..))`.
    pub async fn verify(&self, image: Option<CapturedImage>) -> Result<Verdict, FlowError> {
        let result = self.run(image).await;
        match &result {
            Ok(Verdict::Accepted(profile)) => {
                enter(VerifyStage::Accepted);
                info!("login accepted: welcome, {}", profile.name);
            }
            Ok(Verdict::Rejected(rejection)) => {
                enter(VerifyStage::Rejected);
                info!("login rejected: {}", rejection);
            }
            Err(err) => {
                enter(VerifyStage::Failed);
                warn!("verification failed ({}): {}", err.kind(), err);
            }
        }
        result
    }

    async fn run(&self, image: Option<CapturedImage>) -> Result<Verdict, FlowError> {
        enter(VerifyStage::AwaitingInput);
        let image = match image {
            Some(image) if !image.is_empty() => image,
            Some(_) => return Err(FlowError::Validation("captured image is empty".into())),
            None => return Err(FlowError::Validation("capture an image first".into())),
        };

        enter(VerifyStage::Uploading);
        let probe = self.upload(&image).await?;

        let outcome = self.search_and_resolve(&probe.path).await;
        self.cleanup(&probe.path).await;
        outcome
    }

    async fn upload(&self, image: &CapturedImage) -> Result<ArtifactRecord, FlowError> {
        let hint = PathHint::transient(PROBE_FILE_NAME);
        let probe = bounded(
            self.call_timeout,
            self.artifacts.put(&image.bytes, &image.media_type, &hint),
            StoreError::Timeout,
        )
        .await
        .map_err(FlowError::StorageWrite)?;
        debug!("verify: probe stored at {}", probe.path);
        Ok(probe)
    }

    async fn search_and_resolve(&self, probe_path: &str) -> Result<Verdict, FlowError> {
        enter(VerifyStage::Searching);
        let search = bounded(
            self.call_timeout,
            self.index.search(
                probe_path,
                &self.collection_id,
                MAX_CANDIDATES,
                SIMILARITY_FLOOR,
            ),
            IndexError::Timeout,
        )
        .await;

        let candidates = match search {
            Ok(candidates) => candidates,
            Err(e) if e.is_unusable_image() => {
                debug!("verify: {}", e);
                return Ok(Verdict::Rejected(Rejection::NoFace));
            }
            Err(e) => return Err(FlowError::Search(SearchFailure::Index(e))),
        };

        let Some(best) = candidates.into_iter().next() else {
            return Ok(Verdict::Rejected(Rejection::NoMatch));
        };
        debug!(
            "verify: best match {} at {:.1}",
            best.correlation_id, best.similarity
        );

        enter(VerifyStage::Resolving);
        let profile = bounded(
            self.call_timeout,
            self.registry.find_by_artifact_path(&best.correlation_id),
            RegistryError::Timeout,
        )
        .await
        .map_err(|e| FlowError::Search(SearchFailure::Registry(e)))?;

        match profile {
            Some(profile) => Ok(Verdict::Accepted(profile)),
            None => {
                warn!(
                    "template for {} matched at {:.1} but no profile references it; \
                     index and registry are out of sync",
                    best.correlation_id, best.similarity
                );
                Ok(Verdict::Rejected(Rejection::UnknownProfile {
                    correlation_id: best.correlation_id,
                    similarity: best.similarity,
                }))
            }
        }
    }

    async fn cleanup(&self, probe_path: &str) {
        enter(VerifyStage::Cleanup);
        let deleted = bounded(
            self.call_timeout,
            self.artifacts.delete(probe_path),
            StoreError::Timeout,
        )
        .await;
        match deleted {
            Ok(()) => debug!("verify: probe {} deleted", probe_path),
            Err(source) => {
                let err = FlowError::StorageDelete {
                    path: probe_path.to_string(),
                    source,
                };
                warn!("{}; left for out-of-band cleanup", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_accessors() {
        let profile = ProfileRecord {
            profile_key: "k".into(),
            name: "Ada".into(),
            contact_email: "ada@x.com".into(),
            artifact_path: "faces/1_a_face.jpg".into(),
            image_url: "mem://faces/1_a_face.jpg".into(),
            template_id: "t".into(),
        };
        let accepted = Verdict::Accepted(profile.clone());
        assert!(accepted.is_accepted());
        assert_eq!(accepted.profile(), Some(&profile));

        let rejected = Verdict::Rejected(Rejection::NoMatch);
        assert!(!rejected.is_accepted());
        assert_eq!(rejected.profile(), None);
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(Rejection::NoMatch.to_string(), "no matching face found");
        assert_eq!(
            Rejection::UnknownProfile {
                correlation_id: "faces/x".into(),
                similarity: 97.0
            }
            .to_string(),
            "face recognized but no profile found"
        );
    }
}
