#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use facetrack::config::Config;
use facetrack::index::{BiometricIndex, IndexError, LocalBiometricIndex};
use facetrack::registry::{MemoryProfileRegistry, ProfileRegistry, RegistryError};
use facetrack::store::{ArtifactStore, MemoryArtifactStore, Namespace, PathHint, StoreError};
use facetrack::{App, ArtifactRecord, BiometricTemplate, CapturedImage, MatchCandidate, ProfileRecord};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

pub const COLLECTION: &str = "users_faces";

fn png(img: GrayImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Left-to-right gradient. Different `brightness` values are the same face under other light.
pub fn ada(brightness: u32) -> CapturedImage {
    let img = GrayImage::from_fn(64, 64, |x, _| Luma([(40 + brightness + x * 2) as u8]));
    CapturedImage::new(png(img), "image/png")
}

/// Top-to-bottom gradient, uncorrelated with [`ada`]
pub fn grace() -> CapturedImage {
    let img = GrayImage::from_fn(64, 64, |_, y| Luma([(40 + y * 2) as u8]));
    CapturedImage::new(png(img), "image/png")
}

/// Flat frame: nothing to recognise
pub fn blank() -> CapturedImage {
    CapturedImage::new(png(GrayImage::from_pixel(64, 64, Luma([128]))), "image/png")
}

/// In-memory artifact store that counts calls and fails on request
#[derive(Default)]
pub struct RecordingStore {
    pub inner: Arc<MemoryArtifactStore>,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
    put_delay_ms: AtomicU64,
}

impl RecordingStore {
    pub fn slow_put(&self, delay: Duration) {
        self.put_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn paths(&self, namespace: Namespace) -> Vec<String> {
        self.inner.list(namespace).await.unwrap()
    }
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn put(
        &self,
        bytes: &[u8],
        media_type: &str,
        hint: &PathHint,
    ) -> Result<ArtifactRecord, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("bucket offline".into()));
        }
        self.inner.put(bytes, media_type, hint).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("bucket offline".into()));
        }
        self.inner.delete(path).await
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.fetch(path).await
    }

    async fn list(&self, namespace: Namespace) -> Result<Vec<String>, StoreError> {
        self.inner.list(namespace).await
    }
}

/// Local index that counts calls and fails on request
pub struct RecordingIndex {
    pub inner: LocalBiometricIndex,
    pub creates: AtomicUsize,
    pub enrolls: AtomicUsize,
    pub searches: AtomicUsize,
    pub fail_search: AtomicBool,
}

impl RecordingIndex {
    pub fn new(inner: LocalBiometricIndex) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            enrolls: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            fail_search: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.enrolls.load(Ordering::SeqCst)
            + self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricIndex for RecordingIndex {
    async fn collection_exists(&self, collection_id: &str) -> Result<bool, IndexError> {
        self.inner.collection_exists(collection_id).await
    }

    async fn create_collection(&self, collection_id: &str) -> Result<(), IndexError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_collection(collection_id).await
    }

    async fn enroll(
        &self,
        artifact_path: &str,
        collection_id: &str,
    ) -> Result<BiometricTemplate, IndexError> {
        self.enrolls.fetch_add(1, Ordering::SeqCst);
        self.inner.enroll(artifact_path, collection_id).await
    }

    async fn search(
        &self,
        probe_path: &str,
        collection_id: &str,
        max_candidates: usize,
        similarity_floor: f32,
    ) -> Result<Vec<MatchCandidate>, IndexError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("throttled".into()));
        }
        self.inner
            .search(probe_path, collection_id, max_candidates, similarity_floor)
            .await
    }

    async fn list_templates(
        &self,
        collection_id: &str,
    ) -> Result<Vec<BiometricTemplate>, IndexError> {
        self.inner.list_templates(collection_id).await
    }
}

/// In-memory registry that fails or stalls on request
#[derive(Default)]
pub struct FlakyRegistry {
    pub inner: MemoryProfileRegistry,
    pub fail_insert: AtomicBool,
    pub fail_scan: AtomicBool,
    stall_before_commit_ms: AtomicU64,
    stall_after_commit_ms: AtomicU64,
}

impl FlakyRegistry {
    /// Insert hangs and never writes if abandoned
    pub fn stall_before_commit(&self, delay: Duration) {
        self.stall_before_commit_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Insert writes, then hangs before acknowledging
    pub fn stall_after_commit(&self, delay: Duration) {
        self.stall_after_commit_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProfileRegistry for FlakyRegistry {
    async fn insert(&self, record: ProfileRecord) -> Result<(), RegistryError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("quota exceeded".into()));
        }
        let before = self.stall_before_commit_ms.load(Ordering::SeqCst);
        if before > 0 {
            tokio::time::sleep(Duration::from_millis(before)).await;
        }
        self.inner.insert(record).await?;
        let after = self.stall_after_commit_ms.load(Ordering::SeqCst);
        if after > 0 {
            tokio::time::sleep(Duration::from_millis(after)).await;
        }
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ProfileRecord>, RegistryError> {
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("quota exceeded".into()));
        }
        self.inner.scan().await
    }
}

/// An [`App`] over recording doubles, with handles kept for assertions
pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub index: Arc<RecordingIndex>,
    pub registry: Arc<FlakyRegistry>,
    pub app: App,
}

impl Harness {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let store = Arc::new(RecordingStore::default());
        let index = Arc::new(RecordingIndex::new(LocalBiometricIndex::in_memory(
            store.inner.clone(),
        )));
        let registry = Arc::new(FlakyRegistry::default());
        let cfg = Config {
            collection_id: COLLECTION.to_string(),
            ..Config::default()
        };
        let app = App::with_collaborators(store.clone(), index.clone(), registry.clone(), &cfg);
        Self {
            store,
            index,
            registry,
            app,
        }
    }

    pub async fn enroll_ada(&self) -> ProfileRecord {
        self.app
            .enroller
            .enroll("Ada Lovelace", "ada@example.com", Some(ada(0)))
            .await
            .expect("enrolling Ada")
    }
}
