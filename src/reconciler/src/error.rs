/// Errors from an enrollment source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source could not be reached or answered with an unexpected status
    #[error("enrollment source unavailable: {0}")]
    Unavailable(String),
    /// The source answered with a payload that could not be decoded
    #[error("malformed enrollment payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Malformed(err.to_string())
    }
}

/// Errors from a cluster resource manager
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The cluster could not be reached or answered with a malformed payload
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
    /// The cluster refused the request
    #[error("cluster rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error message from the API server
        message: String,
    },
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ClusterError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ClusterError::Unavailable(err.to_string()),
        }
    }
}

/// The three failure classes a run can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    ClusterUnavailable,
    DeleteFailed,
}

/// Errors that abort a reconciliation run
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to list namespaces: {0}")]
    List(#[source] ClusterError),

    #[error("enrollment lookup failed: {0}")]
    Source(#[from] SourceError),

    #[error("failed to delete namespace {name}: {source}")]
    DeleteNamespace {
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to check volume {name}: {source}")]
    VolumeCheck {
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to delete volume {name}: {source}")]
    DeleteVolume {
        name: String,
        #[source]
        source: ClusterError,
    },

    /// Failures collected from namespaces processed concurrently
    #[error("{} namespaces failed: {}", .0.len(), summarize(.0))]
    Multiple(Vec<ReconcileError>),
}

fn summarize(errors: &[ReconcileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcileError {
    /// Failure class of this error. A `Multiple` takes the class of its first failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::List(_) | ReconcileError::VolumeCheck { .. } => {
                ErrorKind::ClusterUnavailable
            }
            ReconcileError::Source(_) => ErrorKind::SourceUnavailable,
            ReconcileError::DeleteNamespace { .. } | ReconcileError::DeleteVolume { .. } => {
                ErrorKind::DeleteFailed
            }
            ReconcileError::Multiple(errors) => errors
                .first()
                .map(ReconcileError::kind)
                .unwrap_or(ErrorKind::DeleteFailed),
        }
    }
}
