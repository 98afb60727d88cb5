use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ProfileRegistry, RegistryError};
use crate::model::ProfileRecord;

/// Registry kept as one postcard-encoded list of records.
///
/// Insert loads the whole list, appends and publishes a new file with a rename, so readers
/// only ever see a complete list. Each operation runs to completion on a blocking thread
/// while holding the lock, even if the caller stops waiting for it. Concurrent writers from
/// other processes are not coordinated.
#[derive(Debug)]
pub struct FileProfileRegistry {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileProfileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn locked<T, F>(&self, op: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, RegistryError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock = self.lock.clone();
        tokio::task::spawn_blocking(move || {
            // A panicked writer never published, so the file is still whole
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            op(&path)
        })
        .await
        .map_err(|e| RegistryError::Unavailable(format!("profile file task failed: {e}")))?
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RegistryError + '_ {
    move |source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn load_records(path: &Path) -> Result<Vec<ProfileRecord>, RegistryError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(io_error(path)(e)),
    };
    postcard::from_bytes(&data).map_err(|source| RegistryError::Codec {
        path: path.to_path_buf(),
        source,
    })
}

fn store_records(path: &Path, records: &[ProfileRecord]) -> Result<(), RegistryError> {
    let data = postcard::to_allocvec(records).map_err(|source| RegistryError::Codec {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = path.with_file_name(format!(
        ".{name}.{}.part",
        uuid::Uuid::new_v4().simple()
    ));
    let written = File::create(&staging)
        .and_then(|mut file| {
            file.write_all(&data)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&staging, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(io_error(path)(e));
    }
    Ok(())
}

#[async_trait]
impl ProfileRegistry for FileProfileRegistry {
    async fn insert(&self, record: ProfileRecord) -> Result<(), RegistryError> {
        self.locked(move |path| {
            let mut records = load_records(path)?;
            records.push(record);
            store_records(path, &records)
        })
        .await
    }

    async fn scan(&self) -> Result<Vec<ProfileRecord>, RegistryError> {
        self.locked(load_records).await
    }
}
