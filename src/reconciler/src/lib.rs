//! Namespace reconciliation against an enrollment roster.
//!
//! Live namespaces are named after users. A namespace whose user is no longer
//! enrolled is stale: it is deleted together with the persistent volumes
//! derived from the username and the configured suffixes.
//!
//! ## Architecture
//!
//! - `matcher`: string-set helpers used by the roster diff
//! - `volumes`: volume name derivation
//! - `enrollment`: the enrollment source capability and its HTTP and static variants
//! - `cluster`: the cluster capability and its Kubernetes and in-memory variants
//! - `engine`: classification and the deletion sequence
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use reconciler::{ReconcileSettings, ReconciliationEngine};
//! use reconciler::cluster::InMemoryCluster;
//! use reconciler::enrollment::StaticRoster;
//!
//! # async fn run() -> Result<(), reconciler::ReconcileError> {
//! let roster = Arc::new(StaticRoster::from_usernames(["btice", "pbotros"]));
//! let cluster = Arc::new(InMemoryCluster::with_namespaces(["btice", "pbotros", "dvader"]));
//! let engine = ReconciliationEngine::new(ReconcileSettings::default(), roster, cluster);
//!
//! let report = engine.reconcile(true).await?;
//! assert_eq!(report.stale, vec!["dvader".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod matcher;
pub mod report;
pub mod volumes;

// Re-export commonly used types
pub use cluster::ClusterResourceManager;
pub use common::config::Strategy;
pub use engine::{Classification, ReconcileSettings, ReconciliationEngine};
pub use enrollment::EnrollmentSource;
pub use error::{ClusterError, ErrorKind, ReconcileError, SourceError};
pub use report::{Notice, ReconcileReport};
