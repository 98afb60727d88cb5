//! Artifact store: durable object storage for face images, addressed by path.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{ArtifactRecord, DEFAULT_CAPTURE_NAME};

pub mod fs;
pub mod memory;

pub use self::fs::FsArtifactStore;
pub use self::memory::MemoryArtifactStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("artifact store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
}

/// Top-level path prefix separating kept images from single-use ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Enrollment images, referenced by profile records
    Permanent,
    /// Login probes, deleted after one verification attempt
    Transient,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Permanent => "faces",
            Namespace::Transient => "temp",
        }
    }

    pub fn of(path: &str) -> Option<Self> {
        let (prefix, _) = path.split_once('/')?;
        [Namespace::Permanent, Namespace::Transient]
            .into_iter()
            .find(|ns| ns.prefix() == prefix)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Caller's suggestion for an object path. The store adds a discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHint {
    pub namespace: Namespace,
    pub file_name: String,
}

impl PathHint {
    pub fn permanent(file_name: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Permanent,
            file_name: file_name.into(),
        }
    }

    pub fn transient(file_name: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Transient,
            file_name: file_name.into(),
        }
    }
}

/// Build a unique object path: `<namespace>/<millis>_<random>_<file name>`.
///
/// The file name is reduced to `[A-Za-z0-9._-]` so a hint can never escape its namespace.
pub fn derive_path(hint: &PathHint, now: DateTime<Utc>) -> String {
    let discriminator = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}_{}_{}",
        hint.namespace.prefix(),
        now.timestamp_millis(),
        &discriminator[..12],
        sanitize_file_name(&hint.file_name)
    )
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_CAPTURE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Durable, publicly fetchable image storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under a fresh path derived from `hint`.
    async fn put(
        &self,
        bytes: &[u8],
        media_type: &str,
        hint: &PathHint,
    ) -> Result<ArtifactRecord, StoreError>;

    /// Remove an object. Removing a missing path succeeds.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Read an object back by path
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// All object paths in a namespace, sorted
    async fn list(&self, namespace: Namespace) -> Result<Vec<String>, StoreError>;
}
