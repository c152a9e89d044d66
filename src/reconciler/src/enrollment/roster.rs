//! Fixed in-process roster.

use std::path::Path;

use async_trait::async_trait;

use super::{EnrollmentSource, UserRecord};
use crate::error::SourceError;

/// Enrollment source answering from a fixed list of users.
///
/// Used for tests and offline dry runs against an exported roster.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    /// (username, enrolled) in insertion order
    users: Vec<(String, bool)>,
}

impl StaticRoster {
    /// Every given username is enrolled.
    pub fn from_usernames<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: usernames.into_iter().map(|name| (name.into(), true)).collect(),
        }
    }

    /// Users with at least one enrollment are enrolled, the rest are known but inactive.
    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: records
                .into_iter()
                .map(|record| {
                    let enrolled = record.is_enrolled();
                    (record.username, enrolled)
                })
                .collect(),
        }
    }

    /// Parse a JSON array of user records.
    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        let records: Vec<UserRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    /// Read a JSON array of user records from a file.
    pub fn from_json_file(path: &Path) -> Result<Self, SourceError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SourceError::Unavailable(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Mark `username` as no longer enrolled.
    pub fn unenroll(&mut self, username: &str) {
        for (name, enrolled) in &mut self.users {
            if name == username {
                *enrolled = false;
            }
        }
    }
}

#[async_trait]
impl EnrollmentSource for StaticRoster {
    async fn list_enrolled_usernames(&self) -> Result<Vec<String>, SourceError> {
        Ok(self
            .users
            .iter()
            .filter(|(_, enrolled)| *enrolled)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn is_user_active(&self, username: &str) -> Result<bool, SourceError> {
        Ok(self
            .users
            .iter()
            .any(|(name, enrolled)| *enrolled && name == username))
    }
}
