use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use tokio::io::AsyncWriteExt;

use super::{derive_path, ArtifactStore, Namespace, PathHint, StoreError};
use crate::model::ArtifactRecord;

/// Artifact store on the local filesystem, one file per object under `root`.
///
/// Fetch URLs use `public_base_url` when set (for a directory served over HTTP),
/// otherwise a `file://` URL. Each object's media type is kept beside it in a hidden
/// `.<name>.media-type` file so a server in front of the directory can set `Content-Type`.
///
/// A put is published with a rename after its bytes are fully written. Hidden files
/// (staging leftovers and media types) are never listed as objects.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Media type recorded when the object was stored
    pub async fn media_type(&self, path: &str) -> Result<Option<String>, StoreError> {
        let full = self.resolve(path)?;
        let sidecar = hidden_sibling(&full, MEDIA_TYPE_SUFFIX);
        match tokio::fs::read_to_string(&sidecar).await {
            Ok(media_type) => Ok(Some(media_type)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&sidecar)(e)),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let well_formed = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn fetch_url(&self, path: &str, full: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), path),
            None => format!("file://{}", full.display()),
        }
    }
}

const MEDIA_TYPE_SUFFIX: &str = "media-type";

/// `<dir>/.<file name>.<suffix>`
fn hidden_sibling(full: &Path, suffix: &str) -> PathBuf {
    let name = full
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    full.with_file_name(format!(".{name}.{suffix}"))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A file written ahead of publishing. Removed on drop unless committed.
struct Staged {
    path: PathBuf,
    committed: bool,
}

impl Staged {
    fn new(target: &Path, what: &str) -> Self {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        Self {
            path: hidden_sibling(target, &format!("{what}.{}.part", &tag[..8])),
            committed: false,
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
            .map_err(io_error(&self.path))?;
        file.write_all(bytes).await.map_err(io_error(&self.path))?;
        file.flush().await.map_err(io_error(&self.path))
    }

    /// Move into place. Synchronous so it can't be abandoned halfway by a dropped future.
    fn publish(mut self, target: &Path) -> Result<(), StoreError> {
        std::fs::rename(&self.path, target).map_err(io_error(target))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        bytes: &[u8],
        media_type: &str,
        hint: &PathHint,
    ) -> Result<ArtifactRecord, StoreError> {
        let path = derive_path(hint, Utc::now());
        let full = self.resolve(&path)?;

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }

        let object = Staged::new(&full, "object");
        object.write(bytes).await?;
        let sidecar = Staged::new(&full, MEDIA_TYPE_SUFFIX);
        sidecar.write(media_type.as_bytes()).await?;

        // No await from here on: either both land or neither is visible
        let media_type_file = hidden_sibling(&full, MEDIA_TYPE_SUFFIX);
        sidecar.publish(&media_type_file)?;
        if let Err(e) = object.publish(&full) {
            let _ = std::fs::remove_file(&media_type_file);
            return Err(e);
        }

        debug!("stored {} ({} bytes, {})", path, bytes.len(), media_type);

        let fetch_url = self.fetch_url(&path, &full);
        Ok(ArtifactRecord { path, fetch_url })
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        for file in [full.clone(), hidden_sibling(&full, MEDIA_TYPE_SUFFIX)] {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("delete of missing file {} ignored", file.display());
                }
                Err(e) => return Err(io_error(&file)(e)),
            }
        }
        Ok(())
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(path.to_string())),
            Err(e) => Err(io_error(&full)(e)),
        }
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(namespace.prefix());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_error(&dir)(e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
            let file_type = entry.file_type().await.map_err(io_error(&dir))?;
            if !file_type.is_file() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with('.') => {
                    paths.push(format!("{}/{}", namespace.prefix(), name));
                }
                _ => {}
            }
        }
        paths.sort();
        Ok(paths)
    }
}
