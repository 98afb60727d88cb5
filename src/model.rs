use serde::{Deserialize, Serialize};

/// Name used in the permanent path hint when the capture surface doesn't provide one
pub const DEFAULT_CAPTURE_NAME: &str = "face.jpg";

/// One still frame from the capture surface. Consumed by exactly one enroll or verify attempt.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub file_name: String,
}

impl CapturedImage {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            file_name: DEFAULT_CAPTURE_NAME.to_string(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where an uploaded image landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: String,
    pub fetch_url: String,
}

/// A face template enrolled in a collection.
///
/// `correlation_id` is the artifact path the template was derived from. It is the only link
/// between the biometric index and the profile registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricTemplate {
    pub template_id: String,
    pub correlation_id: String,
}

/// A registered user. Written once per successful enrollment, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub profile_key: String,
    pub name: String,
    pub contact_email: String,
    pub artifact_path: String,
    pub image_url: String,
    pub template_id: String,
}

/// A search hit, similarity on the 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub correlation_id: String,
    pub similarity: f32,
}
