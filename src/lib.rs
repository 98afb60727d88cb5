pub mod app;
pub mod capture;
pub mod config;
pub mod deadline;
pub mod enroll;
pub mod error;
pub mod index;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod verify;

pub use app::App;
pub use enroll::Enroller;
pub use error::{FailureKind, FlowError};
pub use model::{ArtifactRecord, BiometricTemplate, CapturedImage, MatchCandidate, ProfileRecord};
pub use verify::{Rejection, Verdict, Verifier};

// Re-export vision types for convenience
pub use facetrack_vision::{Embedding, Pipeline};
