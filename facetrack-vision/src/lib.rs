pub mod face;
pub mod pipeline;

// Re-export commonly used types
pub use face::{match_embedding, similarity_percent, Embedding};
pub use pipeline::{Pipeline, VisionError};
