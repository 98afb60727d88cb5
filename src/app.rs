use std::sync::Arc;

use crate::config::Config;
use crate::enroll::Enroller;
use crate::index::{BiometricIndex, LocalBiometricIndex};
use crate::reconcile::Reconciler;
use crate::registry::{FileProfileRegistry, ProfileRegistry};
use crate::store::{ArtifactStore, FsArtifactStore};
use crate::verify::Verifier;

/// Collaborators wired once and shared by every attempt
pub struct App {
    pub enroller: Enroller,
    pub verifier: Verifier,
    pub reconciler: Reconciler,
    pub registry: Arc<dyn ProfileRegistry>,
}

impl App {
    /// Local backends under `cfg.data_dir`
    pub fn from_config(cfg: &Config) -> Self {
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(
            cfg.artifact_dir(),
            cfg.public_base_url.clone(),
        ));
        let index: Arc<dyn BiometricIndex> =
            Arc::new(LocalBiometricIndex::open(cfg.index_dir(), artifacts.clone()));
        let registry: Arc<dyn ProfileRegistry> =
            Arc::new(FileProfileRegistry::new(cfg.profile_file()));
        Self::with_collaborators(artifacts, index, registry, cfg)
    }

    pub fn with_collaborators(
        artifacts: Arc<dyn ArtifactStore>,
        index: Arc<dyn BiometricIndex>,
        registry: Arc<dyn ProfileRegistry>,
        cfg: &Config,
    ) -> Self {
        let timeout = cfg.call_timeout();
        Self {
            enroller: Enroller::new(
                artifacts.clone(),
                index.clone(),
                registry.clone(),
                cfg.collection_id.as_str(),
            )
            .with_call_timeout(timeout),
            verifier: Verifier::new(
                artifacts.clone(),
                index.clone(),
                registry.clone(),
                cfg.collection_id.as_str(),
            )
            .with_call_timeout(timeout),
            reconciler: Reconciler::new(artifacts, index, registry.clone(), cfg.collection_id.as_str()),
            registry,
        }
    }
}
