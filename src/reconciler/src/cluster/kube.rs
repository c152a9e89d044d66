//! Kubernetes REST API client for namespaces and persistent volumes.

use std::time::Duration;

use async_trait::async_trait;
use common::config::ClusterConfig;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use url::Url;

use super::ClusterResourceManager;
use crate::error::ClusterError;

/// Page size used when listing namespaces.
const LIST_PAGE_SIZE: &str = "500";

#[derive(Debug, Deserialize)]
struct NamespaceList {
    #[serde(default)]
    metadata: ListMeta,
    #[serde(default)]
    items: Vec<Namespace>,
}

#[derive(Debug, Default, Deserialize)]
struct ListMeta {
    #[serde(rename = "continue")]
    continue_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    metadata: ObjectMeta,
    status: Option<NamespaceStatus>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct NamespaceStatus {
    phase: Option<String>,
}

/// Error body returned by the API server.
#[derive(Debug, Deserialize)]
struct Status {
    message: Option<String>,
}

/// Cluster resource manager talking to the Kubernetes API server.
pub struct KubeApiClient {
    http: reqwest::Client,
    api_server: Url,
    token: Option<String>,
}

impl KubeApiClient {
    /// Create a client for `api_server`.
    ///
    /// `ca_pem` adds a trusted root for the API server certificate.
    pub fn new(
        api_server: Url,
        token: Option<String>,
        ca_pem: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Self, ClusterError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(pem) = ca_pem {
            let certificate = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ClusterError::Unavailable(format!("invalid CA bundle: {e}")))?;
            builder = builder.add_root_certificate(certificate);
        }

        let http = builder
            .build()
            .map_err(|e| ClusterError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            api_server,
            token,
        })
    }

    /// Create a client from configuration, falling back to the in-cluster service account.
    ///
    /// A missing token or CA file is tolerated (e.g. behind `kubectl proxy`).
    pub async fn from_config(config: &ClusterConfig) -> Result<Self, ClusterError> {
        let api_server = match &config.api_server {
            Some(api_server) => api_server.clone(),
            None => in_cluster_api_server()?,
        };
        let api_server = Url::parse(&api_server)
            .map_err(|e| ClusterError::Unavailable(format!("invalid API server URL: {e}")))?;

        let token = match tokio::fs::read_to_string(&config.token_file).await {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) => {
                tracing::warn!(
                    path = %config.token_file.display(),
                    error = %e,
                    "No service account token, sending unauthenticated requests"
                );
                None
            }
        };

        let ca_pem = match &config.ca_file {
            Some(path) => match tokio::fs::read(path).await {
                Ok(pem) => Some(pem),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "CA bundle not readable, using system roots"
                    );
                    None
                }
            },
            None => None,
        };

        tracing::info!(api_server = %api_server, "Connecting to Kubernetes API");

        Self::new(api_server, token, ca_pem.as_deref(), config.timeout)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClusterError> {
        let mut url = self.api_server.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClusterError::Unavailable(format!("{} cannot be a base URL", self.api_server))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response, ClusterError> {
        let mut request = self.http.request(method, url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    async fn exists(&self, segments: &[&str]) -> Result<bool, ClusterError> {
        let url = self.url(segments)?;
        let response = self.send(Method::GET, url).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(rejection(response).await),
        }
    }

    async fn delete(&self, segments: &[&str]) -> Result<(), ClusterError> {
        let url = self.url(segments)?;
        let response = self.send(Method::DELETE, url).await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!(resource = %segments.join("/"), "Already deleted");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            _ => Err(rejection(response).await),
        }
    }
}

fn in_cluster_api_server() -> Result<String, ClusterError> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
        ClusterError::Unavailable(
            "KUBERNETES_SERVICE_HOST is not set; configure cluster.api_server".to_string(),
        )
    })?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

    Ok(format_api_server(&host, &port))
}

fn format_api_server(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

async fn rejection(response: reqwest::Response) -> ClusterError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Status>(&body)
        .ok()
        .and_then(|status| status.message)
        .unwrap_or(body);

    ClusterError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ClusterResourceManager for KubeApiClient {
    async fn list_namespace_names(&self) -> Result<Vec<String>, ClusterError> {
        let mut names = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut url = self.url(&["api", "v1", "namespaces"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", LIST_PAGE_SIZE);
                if let Some(token) = &continue_token {
                    query.append_pair("continue", token);
                }
            }

            let response = self.send(Method::GET, url).await?;
            if !response.status().is_success() {
                return Err(rejection(response).await);
            }

            let page: NamespaceList = response
                .json()
                .await
                .map_err(|e| ClusterError::Unavailable(format!("malformed namespace list: {e}")))?;

            for namespace in page.items {
                let terminating = namespace
                    .status
                    .and_then(|status| status.phase)
                    .is_some_and(|phase| phase == "Terminating");
                if terminating {
                    tracing::debug!(namespace = %namespace.metadata.name, "Skipping terminating namespace");
                    continue;
                }
                names.push(namespace.metadata.name);
            }

            match page.metadata.continue_token {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.exists(&["api", "v1", "namespaces", name]).await
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.exists(&["api", "v1", "persistentvolumes", name]).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.delete(&["api", "v1", "namespaces", name]).await
    }

    async fn delete_volume(&self, name: &str) -> Result<(), ClusterError> {
        self.delete(&["api", "v1", "persistentvolumes", name]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> KubeApiClient {
        KubeApiClient::new(
            Url::parse(&server.uri()).unwrap(),
            Some("token".to_string()),
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn namespace(name: &str, phase: &str) -> serde_json::Value {
        json!({"metadata": {"name": name}, "status": {"phase": phase}})
    }

    #[tokio::test]
    async fn test_list_namespaces_follows_continue_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces"))
            .and(query_param("continue", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {},
                "items": [namespace("pbotros", "Active")]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces"))
            .and(header("Authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {"continue": "page-2"},
                "items": [namespace("btice", "Active"), namespace("dvader", "Terminating")]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let names = client.list_namespace_names().await.unwrap();

        assert_eq!(names, vec!["btice", "pbotros"]);
    }

    #[tokio::test]
    async fn test_list_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "kind": "Status",
                "message": "namespaces is forbidden"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).list_namespace_names().await.unwrap_err();

        match err {
            ClusterError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "namespaces is forbidden");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_volume_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/persistentvolumes/dvader-home"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {"name": "dvader-home"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/persistentvolumes/dvader-teams"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/persistentvolumes/dvader-support"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.volume_exists("dvader-home").await.unwrap());
        assert!(!client.volume_exists("dvader-teams").await.unwrap());
        assert!(client.volume_exists("dvader-support").await.is_err());
    }

    #[tokio::test]
    async fn test_namespace_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/btice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(namespace("btice", "Active")))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.namespace_exists("btice").await.unwrap());
        // Unmatched requests get 404 from the mock server
        assert!(!client.namespace_exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_namespace_and_volume() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/namespaces/dvader"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/persistentvolumes/dvader-home"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.delete_namespace("dvader").await.unwrap();
        client.delete_volume("dvader-home").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_resource_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/namespaces/dvader"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client_for(&server).delete_namespace("dvader").await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/persistentvolumes/dvader-home"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_volume("dvader-home")
            .await
            .unwrap_err();

        assert!(matches!(err, ClusterError::Rejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_api_server() {
        let client = KubeApiClient::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            None,
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client.list_namespace_names().await.unwrap_err();
        assert!(matches!(err, ClusterError::Unavailable(_)));
    }

    #[test]
    fn test_format_api_server() {
        assert_eq!(format_api_server("10.0.0.1", "443"), "https://10.0.0.1:443");
        assert_eq!(format_api_server("fd00::1", "6443"), "https://[fd00::1]:6443");
    }

    #[tokio::test]
    async fn test_from_config_tolerates_missing_credentials() {
        let config = ClusterConfig {
            api_server: Some("http://127.0.0.1:8001".to_string()),
            token_file: "/nonexistent/token".into(),
            ca_file: Some("/nonexistent/ca.crt".into()),
            timeout: Duration::from_secs(1),
        };

        let client = KubeApiClient::from_config(&config).await.unwrap();
        assert!(client.token.is_none());
    }

    #[tokio::test]
    async fn test_from_config_reads_token() {
        let dir = tempfile::tempdir().unwrap();
        let token_file = dir.path().join("token");
        std::fs::write(&token_file, "abc123\n").unwrap();

        let config = ClusterConfig {
            api_server: Some("http://127.0.0.1:8001".to_string()),
            token_file,
            ca_file: None,
            timeout: Duration::from_secs(1),
        };

        let client = KubeApiClient::from_config(&config).await.unwrap();
        assert_eq!(client.token.as_deref(), Some("abc123"));
    }
}
