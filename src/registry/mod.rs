//! Profile registry: user records correlated to enrolled faces by artifact path.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use thiserror::Error;

use crate::model::ProfileRecord;

pub mod file;
pub mod memory;

pub use self::file::FileProfileRegistry;
pub use self::memory::MemoryProfileRegistry;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("profile file {path} is invalid: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: postcard::Error,
    },

    #[error("profile registry call timed out after {0:?}")]
    Timeout(Duration),

    #[error("profile registry unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProfileRegistry: Send + Sync {
    /// Append a record. Keys and emails are not checked for uniqueness.
    async fn insert(&self, record: ProfileRecord) -> Result<(), RegistryError>;

    /// Every record, in storage order
    async fn scan(&self) -> Result<Vec<ProfileRecord>, RegistryError>;

    /// First record whose `artifact_path` equals `path`.
    ///
    /// This is a full scan with no index behind it: cost grows linearly with the number of
    /// profiles. Callers with latency requirements must account for that. When several
    /// records claim the same path the first in storage order wins and the clash is logged.
    async fn find_by_artifact_path(
        &self,
        path: &str,
    ) -> Result<Option<ProfileRecord>, RegistryError> {
        let mut matches = self
            .scan()
            .await?
            .into_iter()
            .filter(|r| r.artifact_path == path);
        let first = matches.next();
        let others = matches.count();
        if others > 0 {
            warn!(
                "{} profile records claim artifact {}; using the first",
                others + 1,
                path
            );
        }
        Ok(first)
    }
}
