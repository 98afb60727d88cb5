use std::fmt;

use thiserror::Error;

use crate::index::IndexError;
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Why the search-and-resolve phase of a login could not finish
#[derive(Debug, Error)]
pub enum SearchFailure {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("profile lookup failed: {0}")]
    Registry(#[from] RegistryError),
}

/// Failure of one enroll or verify attempt. Each variant is one terminal failure kind.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("failed to store image: {0}")]
    StorageWrite(#[source] StoreError),

    /// Only ever logged: cleanup failures never become an attempt's result.
    #[error("failed to delete {path}: {source}")]
    StorageDelete {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("face enrollment failed: {0}")]
    Enrollment(#[source] IndexError),

    #[error("face search failed: {0}")]
    Search(#[source] SearchFailure),

    #[error("failed to save profile: {0}")]
    Persistence(#[source] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Validation,
    StorageWrite,
    StorageDelete,
    Enrollment,
    Search,
    Persistence,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Validation => "ValidationError",
            FailureKind::StorageWrite => "StorageWriteError",
            FailureKind::StorageDelete => "StorageDeleteError",
            FailureKind::Enrollment => "EnrollmentError",
            FailureKind::Search => "SearchError",
            FailureKind::Persistence => "PersistenceError",
        };
        f.write_str(name)
    }
}

impl FlowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FlowError::Validation(_) => FailureKind::Validation,
            FlowError::StorageWrite(_) => FailureKind::StorageWrite,
            FlowError::StorageDelete { .. } => FailureKind::StorageDelete,
            FlowError::Enrollment(_) => FailureKind::Enrollment,
            FlowError::Search(_) => FailureKind::Search,
            FlowError::Persistence(_) => FailureKind::Persistence,
        }
    }

    /// Transport trouble that may clear up on its own, as opposed to input the user must change.
    pub fn is_transient(&self) -> bool {
        match self {
            FlowError::Validation(_) => false,
            FlowError::Enrollment(e) => !matches!(
                e,
                IndexError::UnusableImage { .. } | IndexError::InvalidCollection(_)
            ),
            _ => true,
        }
    }

    /// Message for the presentation layer, without collaborator details
    pub fn user_message(&self) -> &'static str {
        match self {
            FlowError::Validation(_) => "Please enter all details and capture an image first.",
            FlowError::Enrollment(e) if e.is_unusable_image() => {
                "No face could be detected. Face the camera in good light and try again."
            }
            FlowError::Enrollment(IndexError::InvalidCollection(_)) => {
                "The face collection is misconfigured. Contact an administrator."
            }
            FlowError::StorageWrite(_) => "Image upload failed. Please try again.",
            FlowError::StorageDelete { .. } => "Temporary image could not be removed.",
            FlowError::Enrollment(_) | FlowError::Search(_) => {
                "Face recognition is unavailable right now. Please try again."
            }
            FlowError::Persistence(_) => "Your profile could not be saved. Please try again.",
        }
    }
}
