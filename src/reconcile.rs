//! Read-only consistency report across the three collaborators.
//!
//! Enrollment and verification leave orphans behind by design when a later step fails or
//! an attempt is abandoned. This scan finds them; it never deletes anything.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::index::{BiometricIndex, IndexError};
use crate::model::BiometricTemplate;
use crate::registry::ProfileRegistry;
use crate::store::{ArtifactStore, Namespace};

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub profiles: usize,
    pub templates: usize,
    /// Permanent images no profile points at
    pub orphaned_artifacts: Vec<String>,
    /// Templates whose correlation id no profile carries
    pub orphaned_templates: Vec<BiometricTemplate>,
    /// Login probes that were never cleaned up
    pub stale_probes: Vec<String>,
    /// Artifact paths claimed by more than one profile
    pub duplicate_paths: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_artifacts.is_empty()
            && self.orphaned_templates.is_empty()
            && self.stale_probes.is_empty()
            && self.duplicate_paths.is_empty()
    }
}

pub struct Reconciler {
    artifacts: Arc<dyn ArtifactStore>,
    index: Arc<dyn BiometricIndex>,
    registry: Arc<dyn ProfileRegistry>,
    collection_id: String,
}

impl Reconciler {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        index: Arc<dyn BiometricIndex>,
        registry: Arc<dyn ProfileRegistry>,
        collection_id: impl Into<String>,
    ) -> Self {
        Self {
            artifacts,
            index,
            registry,
            collection_id: collection_id.into(),
        }
    }

    pub async fn scan(&self) -> Result<ReconcileReport> {
        let profiles = self
            .registry
            .scan()
            .await
            .context("scanning profile registry")?;

        let mut claims: HashMap<&str, usize> = HashMap::new();
        for profile in &profiles {
            *claims.entry(profile.artifact_path.as_str()).or_default() += 1;
        }
        let claimed: HashSet<&str> = claims.keys().copied().collect();

        let mut duplicate_paths: Vec<String> = claims
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(path, _)| path.to_string())
            .collect();
        duplicate_paths.sort();

        let templates = match self.index.list_templates(&self.collection_id).await {
            Ok(templates) => templates,
            Err(IndexError::CollectionNotFound(_)) => vec![],
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("listing templates in collection {}", self.collection_id)
                })
            }
        };

        let orphaned_templates: Vec<BiometricTemplate> = templates
            .iter()
            .filter(|t| !claimed.contains(t.correlation_id.as_str()))
            .cloned()
            .collect();

        let orphaned_artifacts: Vec<String> = self
            .artifacts
            .list(Namespace::Permanent)
            .await
            .context("listing stored face images")?
            .into_iter()
            .filter(|path| !claimed.contains(path.as_str()))
            .collect();

        let stale_probes = self
            .artifacts
            .list(Namespace::Transient)
            .await
            .context("listing login probes")?;

        let report = ReconcileReport {
            profiles: profiles.len(),
            templates: templates.len(),
            orphaned_artifacts,
            orphaned_templates,
            stale_probes,
            duplicate_paths,
        };

        for path in &report.orphaned_artifacts {
            warn!("orphaned artifact: {}", path);
        }
        for template in &report.orphaned_templates {
            warn!(
                "orphaned template {} (correlation {})",
                template.template_id, template.correlation_id
            );
        }
        for path in &report.stale_probes {
            warn!("stale login probe: {}", path);
        }
        for path in &report.duplicate_paths {
            warn!("artifact {} is claimed by several profiles", path);
        }
        info!(
            "reconcile: {} profile(s), {} template(s), {}",
            report.profiles,
            report.templates,
            if report.is_clean() { "clean" } else { "issues found" }
        );

        Ok(report)
    }
}
