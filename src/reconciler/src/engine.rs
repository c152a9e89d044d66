//! Reconciliation Engine
//!
//! Classifies live namespaces as kept or stale and deletes every stale
//! namespace together with its derived volumes.
//!
//! ## Guarantees
//!
//! - Dry-run mode issues no delete calls and no existence checks
//! - A namespace is deleted before any of its volumes is addressed
//! - The first hard error aborts a sequential run; concurrent runs report every failure
//! - No state survives a run, so reruns converge

use std::sync::Arc;

use chrono::Utc;
use common::config::{ReconcileConfig, Strategy};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cluster::ClusterResourceManager;
use crate::enrollment::EnrollmentSource;
use crate::error::ReconcileError;
use crate::matcher;
use crate::report::{Notice, ReconcileReport};
use crate::volumes::derive_volume_names;

/// Settings the engine is constructed with.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub strategy: Strategy,
    pub volume_suffixes: Vec<String>,
    pub protected_namespaces: Vec<String>,
    /// Stale namespaces processed at once; 1 keeps the run strictly sequential
    pub max_concurrency: usize,
    /// Treat a failed volume existence check as "absent" instead of aborting
    pub existence_errors_as_absent: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for ReconcileSettings {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            strategy: config.strategy,
            volume_suffixes: config.volume_suffixes.clone(),
            protected_namespaces: config.protected_namespaces.clone(),
            max_concurrency: config.max_concurrency.max(1),
            existence_errors_as_absent: config.existence_errors_as_absent,
        }
    }
}

/// Per-run keep/stale decision for every live namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Never classified
    pub protected: Vec<String>,
    pub kept: Vec<String>,
    pub stale: Vec<String>,
}

pub struct ReconciliationEngine {
    settings: ReconcileSettings,
    enrollment: Arc<dyn EnrollmentSource>,
    cluster: Arc<dyn ClusterResourceManager>,
}

impl ReconciliationEngine {
    pub fn new(
        settings: ReconcileSettings,
        enrollment: Arc<dyn EnrollmentSource>,
        cluster: Arc<dyn ClusterResourceManager>,
    ) -> Self {
        Self {
            settings,
            enrollment,
            cluster,
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Run one reconciliation pass.
    ///
    /// Lists the live namespaces, classifies them and deletes the stale ones
    /// with their volumes. With `dry_run` only notices are produced.
    pub async fn reconcile(&self, dry_run: bool) -> Result<ReconcileReport, ReconcileError> {
        let started_at = Utc::now();
        let run_id = format!("reconcile_{}", started_at.timestamp_millis());

        info!(
            run_id = %run_id,
            dry_run,
            strategy = %self.settings.strategy,
            "Starting reconciliation run"
        );

        let namespaces = self
            .cluster
            .list_namespace_names()
            .await
            .map_err(ReconcileError::List)?;

        let classification = self.classify(&namespaces).await?;

        info!(
            run_id = %run_id,
            seen = namespaces.len(),
            protected = classification.protected.len(),
            kept = classification.kept.len(),
            stale = classification.stale.len(),
            "Classified namespaces"
        );

        let notices = if self.settings.max_concurrency <= 1 {
            self.reap_sequential(&classification.stale, dry_run).await?
        } else {
            self.reap_concurrent(&classification.stale, dry_run).await?
        };

        let report = ReconcileReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            dry_run,
            namespaces_seen: namespaces,
            protected: classification.protected,
            kept: classification.kept,
            stale: classification.stale,
            notices,
        };

        info!(
            run_id = %report.run_id,
            dry_run,
            namespaces_deleted = report.namespaces_deleted(),
            volumes_deleted = report.volumes_deleted(),
            volumes_skipped = report.volumes_skipped(),
            duration_ms = report.duration_ms(),
            "Reconciliation run complete"
        );

        Ok(report)
    }

    /// Split `namespaces` into protected, kept and stale using the configured strategy.
    ///
    /// Any enrollment lookup failure aborts the classification.
    pub async fn classify(&self, namespaces: &[String]) -> Result<Classification, ReconcileError> {
        let mut classification = Classification::default();
        let mut candidates = Vec::with_capacity(namespaces.len());

        for name in namespaces {
            if matcher::contains(name, &self.settings.protected_namespaces) {
                debug!(namespace = %name, "Namespace is protected");
                classification.protected.push(name.clone());
            } else {
                candidates.push(name.clone());
            }
        }

        match self.settings.strategy {
            Strategy::RosterDiff => {
                let roster = self.enrollment.list_enrolled_usernames().await?;
                debug!(enrolled = roster.len(), "Diffing namespaces against roster");

                classification.stale = matcher::set_difference(&roster, &candidates);
                classification.kept = candidates
                    .into_iter()
                    .filter(|name| matcher::contains(name, &roster))
                    .collect();
            }
            Strategy::PerUser => {
                for name in candidates {
                    if self.enrollment.is_user_active(&name).await? {
                        classification.kept.push(name);
                    } else {
                        debug!(namespace = %name, "User is not enrolled");
                        classification.stale.push(name);
                    }
                }
            }
        }

        Ok(classification)
    }

    async fn reap_sequential(
        &self,
        stale: &[String],
        dry_run: bool,
    ) -> Result<Vec<Notice>, ReconcileError> {
        let mut notices = Vec::new();
        for name in stale {
            notices.extend(self.reap_namespace(name, dry_run).await?);
        }
        Ok(notices)
    }

    async fn reap_concurrent(
        &self,
        stale: &[String],
        dry_run: bool,
    ) -> Result<Vec<Notice>, ReconcileError> {
        let results: Vec<_> = stream::iter(stale)
            .map(|name| self.reap_namespace(name, dry_run))
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let mut notices = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(namespace_notices) => notices.extend(namespace_notices),
                Err(e) => failures.push(e),
            }
        }

        match failures.len() {
            0 => Ok(notices),
            1 => Err(failures.remove(0)),
            _ => Err(ReconcileError::Multiple(failures)),
        }
    }

    /// Delete one stale namespace, then each of its derived volumes.
    async fn reap_namespace(&self, name: &str, dry_run: bool) -> Result<Vec<Notice>, ReconcileError> {
        let mut notices = vec![Notice::WillDeleteNamespace(name.to_string())];

        if dry_run {
            info!(namespace = %name, "[DRY-RUN] Would delete namespace");
        } else {
            info!(namespace = %name, "Will delete namespace");
            self.cluster.delete_namespace(name).await.map_err(|source| {
                ReconcileError::DeleteNamespace {
                    name: name.to_string(),
                    source,
                }
            })?;
            info!(namespace = %name, "Deleted namespace");
            notices.push(Notice::NamespaceDeleted(name.to_string()));
        }

        for volume in derive_volume_names(name, &self.settings.volume_suffixes) {
            notices.push(Notice::WillDeleteVolume(volume.clone()));

            if dry_run {
                info!(namespace = %name, volume = %volume, "[DRY-RUN] Would delete volume");
                continue;
            }

            info!(namespace = %name, volume = %volume, "Will delete volume");

            let exists = match self.cluster.volume_exists(&volume).await {
                Ok(exists) => exists,
                Err(e) if self.settings.existence_errors_as_absent => {
                    warn!(
                        volume = %volume,
                        error = %e,
                        "Existence check failed, treating volume as absent"
                    );
                    false
                }
                Err(source) => {
                    return Err(ReconcileError::VolumeCheck {
                        name: volume,
                        source,
                    });
                }
            };

            if !exists {
                info!(volume = %volume, "Volume does not exist, skipping");
                notices.push(Notice::VolumeSkipped(volume));
                continue;
            }

            self.cluster.delete_volume(&volume).await.map_err(|source| {
                ReconcileError::DeleteVolume {
                    name: volume.clone(),
                    source,
                }
            })?;
            info!(volume = %volume, "Deleted volume");
            notices.push(Notice::VolumeDeleted(volume));
        }

        Ok(notices)
    }
}
