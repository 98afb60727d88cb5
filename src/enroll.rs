//! Register flow: upload the face, enroll its template, record the profile.
//!
//! The three collaborators share no transaction. A failure after the upload leaves
//! what was already created in place and logs it as an orphan for out-of-band
//! reconciliation (see [`crate::reconcile`]); nothing is rolled back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::deadline::{bounded, DEFAULT_CALL_TIMEOUT};
use crate::error::FlowError;
use crate::index::{BiometricIndex, IndexError};
use crate::model::{ArtifactRecord, BiometricTemplate, CapturedImage, ProfileRecord};
use crate::registry::{ProfileRegistry, RegistryError};
use crate::store::{ArtifactStore, PathHint, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollStage {
    AwaitingInput,
    Uploading,
    Enrolling,
    PersistingProfile,
    Done,
    Failed,
}

impl fmt::Display for EnrollStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrollStage::AwaitingInput => "awaiting-input",
            EnrollStage::Uploading => "uploading",
            EnrollStage::Enrolling => "enrolling",
            EnrollStage::PersistingProfile => "persisting-profile",
            EnrollStage::Done => "done",
            EnrollStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(stage: EnrollStage) {
    debug!("enroll: -> {}", stage);
}

/// Validated register input
struct Registration {
    name: String,
    email: String,
    image: CapturedImage,
}

fn validate(
    name: &str,
    email: &str,
    image: Option<CapturedImage>,
) -> Result<Registration, FlowError> {
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() {
        return Err(FlowError::Validation("name is required".into()));
    }
    if email.is_empty() {
        return Err(FlowError::Validation("email is required".into()));
    }
    let image = match image {
        Some(image) if !image.is_empty() => image,
        Some(_) => return Err(FlowError::Validation("captured image is empty".into())),
        None => return Err(FlowError::Validation("capture an image first".into())),
    };
    Ok(Registration {
        name: name.to_string(),
        email: email.to_string(),
        image,
    })
}

pub struct Enroller {
    artifacts: Arc<dyn ArtifactStore>,
    index: Arc<dyn BiometricIndex>,
    registry: Arc<dyn ProfileRegistry>,
    collection_id: String,
    call_timeout: Duration,
}

impl Enroller {
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

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Register a new user from a captured face.
    ///
    /// On success the returned record's `artifact_path` equals the correlation id of the
    /// template enrolled in the same attempt.
    pub async fn enroll(
        &self,
        name: &str,
        email: &str,
        image: Option<CapturedImage>,
    ) -> Result<ProfileRecord, FlowError> {
        match self.run(name, email, image).await {
            Ok(record) => {
                enter(EnrollStage::Done);
                info!(
                    "enrolled {} <{}> as {}",
                    record.name, record.contact_email, record.profile_key
                );
                Ok(record)
            }
            Err(err) => {
                enter(EnrollStage::Failed);
                warn!("enrollment failed ({}): {}", err.kind(), err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        name: &str,
        email: &str,
        image: Option<CapturedImage>,
    ) -> Result<ProfileRecord, FlowError> {
        enter(EnrollStage::AwaitingInput);
        let input = validate(name, email, image)?;

        enter(EnrollStage::Uploading);
        let artifact = self.upload(&input.image).await?;

        enter(EnrollStage::Enrolling);
        let template = match self.enroll_template(&artifact).await {
            Ok(template) => template,
            Err(e) => {
                warn!(
                    "artifact {} orphaned: enrollment did not complete",
                    artifact.path
                );
                return Err(FlowError::Enrollment(e));
            }
        };

        enter(EnrollStage::PersistingProfile);
        let record = ProfileRecord {
            profile_key: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            contact_email: input.email,
            artifact_path: artifact.path,
            image_url: artifact.fetch_url,
            template_id: template.template_id,
        };
        self.persist(&record).await.map_err(|e| {
            warn!(
                "artifact {} and template {} orphaned: profile not recorded",
                record.artifact_path, record.template_id
            );
            FlowError::Persistence(e)
        })?;

        Ok(record)
    }

    /// Insert the profile. An insert that timed out may still land, so a timeout is only
    /// reported once a scan shows the record is absent.
    async fn persist(&self, record: &ProfileRecord) -> Result<(), RegistryError> {
        let inserted = bounded(
            self.call_timeout,
            self.registry.insert(record.clone()),
            RegistryError::Timeout,
        )
        .await;
        let Err(RegistryError::Timeout(limit)) = inserted else {
            return inserted;
        };

        warn!(
            "profile insert for {} timed out after {:?}; checking whether it landed",
            record.profile_key, limit
        );
        let landed = bounded(
            self.call_timeout,
            self.registry.scan(),
            RegistryError::Timeout,
        )
        .await
        .map(|records| records.iter().any(|r| r.profile_key == record.profile_key));
        match landed {
            Ok(true) => {
                info!("profile {} was recorded despite the timeout", record.profile_key);
                Ok(())
            }
            Ok(false) => Err(RegistryError::Timeout(limit)),
            Err(e) => {
                warn!("could not confirm profile {}: {}", record.profile_key, e);
                Err(RegistryError::Timeout(limit))
            }
        }
    }

    async fn upload(&self, image: &CapturedImage) -> Result<ArtifactRecord, FlowError> {
        let hint = PathHint::permanent(image.file_name.as_str());
        let artifact = bounded(
            self.call_timeout,
            self.artifacts.put(&image.bytes, &image.media_type, &hint),
            StoreError::Timeout,
        )
        .await
        .map_err(FlowError::StorageWrite)?;
        debug!("enroll: image stored at {}", artifact.path);
        Ok(artifact)
    }

    async fn enroll_template(
        &self,
        artifact: &ArtifactRecord,
    ) -> Result<BiometricTemplate, IndexError> {
        bounded(
            self.call_timeout,
            self.index.ensure_collection(&self.collection_id),
            IndexError::Timeout,
        )
        .await?;

        let template = bounded(
            self.call_timeout,
            self.index.enroll(&artifact.path, &self.collection_id),
            IndexError::Timeout,
        )
        .await?;

        // The profile record is correlated through the artifact path; refuse anything else
        if template.correlation_id != artifact.path {
            return Err(IndexError::CorrelationMismatch {
                expected: artifact.path.clone(),
                actual: template.correlation_id,
            });
        }
        Ok(template)
    }
}
