//! HTTP client for the AWSEd enrollment API.

use async_trait::async_trait;
use common::config::EnrollmentConfig;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{EnrollmentSource, UserRecord};
use crate::error::SourceError;

/// Roster entry returned by the enrollments endpoint.
#[derive(Debug, Deserialize)]
struct ActiveUser {
    username: String,
}

/// Enrollment source backed by the AWSEd REST API.
///
/// - roster: `GET {endpoint}/enrollments?env={environment}`
/// - per user: `GET {endpoint}/users/{username}`, 404 for unknown users
pub struct AwsedClient {
    http: reqwest::Client,
    base_url: Url,
    environment: String,
}

impl AwsedClient {
    /// Create a client from the enrollment configuration.
    pub fn new(config: &EnrollmentConfig) -> Result<Self, SourceError> {
        let base_url = Url::parse(&config.endpoint)
            .map_err(|e| SourceError::Unavailable(format!("invalid endpoint: {e}")))?;

        let mut headers = reqwest::header::HeaderMap::new();
        match &config.api_key {
            Some(api_key) => {
                let mut value =
                    reqwest::header::HeaderValue::from_str(&format!("AWSEd api_key={api_key}"))
                        .map_err(|e| SourceError::Unavailable(e.to_string()))?;
                value.set_sensitive(true);
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            None => tracing::warn!("No enrollment API key configured, requests are unauthenticated"),
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            environment: config.environment.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Unavailable(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl EnrollmentSource for AwsedClient {
    async fn list_enrolled_usernames(&self) -> Result<Vec<String>, SourceError> {
        let mut url = self.endpoint(&["enrollments"])?;
        url.query_pairs_mut().append_pair("env", &self.environment);

        tracing::debug!(url = %url, "Fetching enrollment roster");

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("{status} from {url}")));
        }

        let body = response.bytes().await?;
        // The API answers `null` for an empty roster
        let users: Option<Vec<ActiveUser>> = serde_json::from_slice(&body)?;
        let usernames: Vec<String> = users
            .unwrap_or_default()
            .into_iter()
            .map(|user| user.username)
            .collect();

        tracing::debug!(enrolled = usernames.len(), "Fetched enrollment roster");

        Ok(usernames)
    }

    async fn is_user_active(&self, username: &str) -> Result<bool, SourceError> {
        let url = self.endpoint(&["users", username])?;

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::debug!(username = %username, "User not known to enrollment source");
            return Ok(false);
        }

        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("{status} from {url}")));
        }

        let body = response.bytes().await?;
        let record: UserRecord = serde_json::from_slice(&body)?;

        tracing::debug!(
            username = %username,
            enrollments = record.enrollments.len(),
            "Fetched user enrollment"
        );

        Ok(record.is_enrolled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EnrollmentConfig {
        EnrollmentConfig {
            endpoint: server.uri(),
            api_key: Some("secret".to_string()),
            environment: "dsmlp".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_list_enrolled_usernames() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enrollments"))
            .and(query_param("env", "dsmlp"))
            .and(header("Authorization", "AWSEd api_key=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"username": "btice"},
                {"username": "pbotros"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        let usernames = client.list_enrolled_usernames().await.unwrap();

        assert_eq!(usernames, vec!["btice", "pbotros"]);
    }

    #[tokio::test]
    async fn test_null_roster_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enrollments"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        assert!(client.list_enrolled_usernames().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_roster_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enrollments"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        let err = client.list_enrolled_usernames().await.unwrap_err();

        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_roster() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enrollments"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        let err = client.list_enrolled_usernames().await.unwrap_err();

        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_user_with_enrollments_is_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/pbotros"))
            .and(header("Authorization", "AWSEd api_key=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": "pbotros",
                "firstName": "paul",
                "lastName": "botros",
                "uid": 1234,
                "enrollments": ["DSC10_FA22_A00"]
            })))
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        assert!(client.is_user_active("pbotros").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_without_enrollments_is_inactive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/tix034"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": "tix034",
                "enrollments": []
            })))
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        assert!(!client.is_user_active("tix034").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_user_is_inactive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/dvadre"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        assert!(!client.is_user_active("dvadre").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_lookup_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/btice"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = AwsedClient::new(&config_for(&server)).unwrap();
        assert!(client.is_user_active("btice").await.is_err());
    }

    #[tokio::test]
    async fn test_endpoint_with_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/btice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": "btice",
                "enrollments": ["MUS206_WI23_D00"]
            })))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.endpoint = format!("{}/api/", server.uri());

        let client = AwsedClient::new(&config).unwrap();
        assert!(client.is_user_active("btice").await.unwrap());
    }

    #[test]
    fn test_username_is_path_escaped() {
        let config = EnrollmentConfig {
            endpoint: "http://awsed.example.edu/api".to_string(),
            ..Default::default()
        };
        let client = AwsedClient::new(&config).unwrap();

        let url = client.endpoint(&["users", "../admin"]).unwrap();
        assert_eq!(url.as_str(), "http://awsed.example.edu/api/users/..%2Fadmin");
    }
}
