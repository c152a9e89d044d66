//! Cluster resource managers list and delete namespaces and persistent volumes.

use async_trait::async_trait;

use crate::error::ClusterError;

pub mod kube;
pub mod memory;

pub use kube::KubeApiClient;
pub use memory::{ClusterCall, InMemoryCluster};

/// Access to the namespaces and volumes of a cluster.
///
/// Deleting a resource that is already gone succeeds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterResourceManager: Send + Sync {
    /// Names of all live namespaces.
    async fn list_namespace_names(&self) -> Result<Vec<String>, ClusterError>;

    async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError>;

    async fn volume_exists(&self, name: &str) -> Result<bool, ClusterError>;

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    async fn delete_volume(&self, name: &str) -> Result<(), ClusterError>;
}
