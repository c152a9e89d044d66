use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "roster-reaper.toml";

/// Prefix for environment overrides, nested with `__`.
pub const ENV_PREFIX: &str = "ROSTER_REAPER__";

/// Legacy variable carrying the enrollment API key.
pub const LEGACY_API_KEY_ENV: &str = "AWSED_API_KEY";

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// How stale namespaces are detected.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Ask the enrollment source about every live namespace.
    #[default]
    PerUser,
    /// Fetch the whole roster once and diff it against the live namespaces.
    RosterDiff,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::PerUser => write!(f, "per_user"),
            Strategy::RosterDiff => write!(f, "roster_diff"),
        }
    }
}

/// Connection settings for the enrollment API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    /// Base URL of the enrollment API
    pub endpoint: String,
    /// API key sent in the `Authorization` header
    pub api_key: Option<String>,
    /// Environment whose enrollments form the roster
    pub environment: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://localhost:8080"),
            api_key: None,
            environment: String::from("dsmlp"),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Connection settings for the Kubernetes API server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// API server URL. Derived from `KUBERNETES_SERVICE_HOST` when unset.
    pub api_server: Option<String>,
    /// File holding the bearer token
    pub token_file: PathBuf,
    /// PEM bundle used to verify the API server
    pub ca_file: Option<PathBuf>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server: None,
            token_file: Path::new(SERVICE_ACCOUNT_DIR).join("token"),
            ca_file: Some(Path::new(SERVICE_ACCOUNT_DIR).join("ca.crt")),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Reconciliation behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Stale namespace detection strategy
    pub strategy: Strategy,
    /// Suffixes appended to a username to name its persistent volumes
    pub volume_suffixes: Vec<String>,
    /// Namespaces that are never classified or deleted
    pub protected_namespaces: Vec<String>,
    /// Number of stale namespaces processed at once
    pub max_concurrency: usize,
    /// Treat a failed volume existence check as "absent" instead of aborting
    pub existence_errors_as_absent: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            volume_suffixes: [
                "-dsmlp-datasets",
                "-dsmlp-datasets-nfs",
                "-home",
                "-home-nfs",
                "-nbgrader",
                "-support",
                "-teams",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            protected_namespaces: ["default", "kube-system", "kube-public", "kube-node-lease"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_concurrency: 1,
            existence_errors_as_absent: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Enrollment API configuration
    pub enrollment: EnrollmentConfig,
    /// Kubernetes API configuration
    pub cluster: ClusterConfig,
    /// Reconciliation configuration
    pub reconcile: ReconcileConfig,
}

impl Configuration {
    fn figment(toml_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from `roster-reaper.toml` and the environment on top of the defaults.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load from the given TOML file and the environment on top of the defaults.
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    /// `AWSED_API_KEY` fills the API key when no other source set it.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let mut config: Configuration = Self::figment(path).extract().map_err(Box::new)?;

        if config.enrollment.api_key.is_none() {
            config.enrollment.api_key = std::env::var(LEGACY_API_KEY_ENV).ok();
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks:
    /// - Enrollment endpoint is an http(s) URL
    /// - Enrollment environment is set
    /// - API server, when given, is an http(s) URL
    /// - Timeouts are positive
    /// - At least one volume suffix, none of them blank
    /// - Concurrency is positive
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_http_url("enrollment.endpoint", &self.enrollment.endpoint)?;

        if self.enrollment.environment.trim().is_empty() {
            anyhow::bail!("enrollment.environment cannot be empty");
        }

        if self.enrollment.timeout.is_zero() {
            anyhow::bail!("enrollment.timeout must be positive");
        }

        if let Some(api_server) = &self.cluster.api_server {
            validate_http_url("cluster.api_server", api_server)?;
        }

        if self.cluster.timeout.is_zero() {
            anyhow::bail!("cluster.timeout must be positive");
        }

        if self.reconcile.volume_suffixes.is_empty() {
            anyhow::bail!("reconcile.volume_suffixes cannot be empty");
        }

        if let Some(blank) = self
            .reconcile
            .volume_suffixes
            .iter()
            .position(|suffix| suffix.trim().is_empty())
        {
            anyhow::bail!("reconcile.volume_suffixes[{blank}] cannot be blank");
        }

        if self.reconcile.max_concurrency == 0 {
            anyhow::bail!(
                "reconcile.max_concurrency must be positive, got {}",
                self.reconcile.max_concurrency
            );
        }

        Ok(())
    }
}

fn validate_http_url(key: &str, value: &str) -> anyhow::Result<()> {
    let parsed =
        url::Url::parse(value).map_err(|e| anyhow::anyhow!("{key} is not a valid URL: {e}"))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => anyhow::bail!("{key} must use http or https, got {other}"),
    }
}
