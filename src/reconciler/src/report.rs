use chrono::{DateTime, Utc};

/// A human-readable step of a run, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    WillDeleteNamespace(String),
    NamespaceDeleted(String),
    WillDeleteVolume(String),
    VolumeDeleted(String),
    /// The volume does not exist, nothing to delete
    VolumeSkipped(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::WillDeleteNamespace(name) => write!(f, "will delete namespace {name}"),
            Notice::NamespaceDeleted(name) => write!(f, "deleted namespace {name}"),
            Notice::WillDeleteVolume(name) => write!(f, "will delete volume {name}"),
            Notice::VolumeDeleted(name) => write!(f, "deleted volume {name}"),
            Notice::VolumeSkipped(name) => write!(f, "volume {name} does not exist, skipping"),
        }
    }
}

/// Result of a complete reconciliation run
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Every live namespace, in listing order
    pub namespaces_seen: Vec<String>,
    /// Live namespaces excluded from classification
    pub protected: Vec<String>,
    pub kept: Vec<String>,
    pub stale: Vec<String>,
    pub notices: Vec<Notice>,
}

impl ReconcileReport {
    pub fn namespaces_deleted(&self) -> usize {
        self.count(|notice| matches!(notice, Notice::NamespaceDeleted(_)))
    }

    pub fn volumes_deleted(&self) -> usize {
        self.count(|notice| matches!(notice, Notice::VolumeDeleted(_)))
    }

    pub fn volumes_skipped(&self) -> usize {
        self.count(|notice| matches!(notice, Notice::VolumeSkipped(_)))
    }

    /// Run duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }

    fn count(&self, predicate: impl Fn(&Notice) -> bool) -> usize {
        self.notices.iter().filter(|notice| predicate(notice)).count()
    }
}
