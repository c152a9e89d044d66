use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::ClusterResourceManager;
use crate::error::ClusterError;

/// A call received by [`InMemoryCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    ListNamespaces,
    NamespaceExists(String),
    VolumeExists(String),
    DeleteNamespace(String),
    DeleteVolume(String),
}

impl ClusterCall {
    /// Whether the call is a delete or a check made only to prepare one.
    pub fn is_mutation_path(&self) -> bool {
        matches!(
            self,
            ClusterCall::VolumeExists(_)
                | ClusterCall::DeleteNamespace(_)
                | ClusterCall::DeleteVolume(_)
        )
    }
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeSet<String>,
    volumes: BTreeSet<String>,
    calls: Vec<ClusterCall>,
    fail_listing: bool,
    failing_deletes: HashSet<String>,
    failing_checks: HashSet<String>,
}

/// Cluster kept in memory, with a journal of every call and injectable failures.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cluster = Self::new();
        for namespace in namespaces {
            cluster.add_namespace(namespace);
        }
        cluster
    }

    pub fn add_namespace(&self, name: impl Into<String>) {
        self.lock().namespaces.insert(name.into());
    }

    pub fn add_volume(&self, name: impl Into<String>) {
        self.lock().volumes.insert(name.into());
    }

    /// Live namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        self.lock().namespaces.iter().cloned().collect()
    }

    /// Live volumes, sorted.
    pub fn volumes(&self) -> Vec<String> {
        self.lock().volumes.iter().cloned().collect()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make namespace listing fail.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    /// Make deleting the namespace or volume `name` fail.
    pub fn fail_delete(&self, name: impl Into<String>) {
        self.lock().failing_deletes.insert(name.into());
    }

    /// Make existence checks for `name` fail.
    pub fn fail_existence_check(&self, name: impl Into<String>) {
        self.lock().failing_checks.insert(name.into());
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(
        &self,
        call: ClusterCall,
        name: &str,
        set: fn(&State) -> &BTreeSet<String>,
    ) -> Result<bool, ClusterError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing_checks.contains(name) {
            return Err(ClusterError::Unavailable(format!(
                "injected failure checking {name}"
            )));
        }
        Ok(set(&state).contains(name))
    }

    fn delete(
        &self,
        call: ClusterCall,
        name: &str,
        set: fn(&mut State) -> &mut BTreeSet<String>,
    ) -> Result<(), ClusterError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing_deletes.contains(name) {
            return Err(ClusterError::Rejected {
                status: 500,
                message: format!("injected failure deleting {name}"),
            });
        }
        set(&mut state).remove(name);
        Ok(())
    }
}

#[async_trait]
impl ClusterResourceManager for InMemoryCluster {
    async fn list_namespace_names(&self) -> Result<Vec<String>, ClusterError> {
        let mut state = self.lock();
        state.calls.push(ClusterCall::ListNamespaces);
        if state.fail_listing {
            return Err(ClusterError::Unavailable("injected listing failure".into()));
        }
        Ok(state.namespaces.iter().cloned().collect())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.check(ClusterCall::NamespaceExists(name.into()), name, |s| &s.namespaces)
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.check(ClusterCall::VolumeExists(name.into()), name, |s| &s.volumes)
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.delete(ClusterCall::DeleteNamespace(name.into()), name, |s| {
            &mut s.namespaces
        })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), ClusterError> {
        self.delete(ClusterCall::DeleteVolume(name.into()), name, |s| &mut s.volumes)
    }
}
