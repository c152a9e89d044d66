//! Enrollment sources decide whether a user is still enrolled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub mod awsed;
pub mod roster;

pub use awsed::AwsedClient;
pub use roster::StaticRoster;

/// Answers enrollment questions about users.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrollmentSource: Send + Sync {
    /// Usernames of every currently enrolled user.
    async fn list_enrolled_usernames(&self) -> Result<Vec<String>, SourceError>;

    /// Whether `username` is enrolled. Unknown users are not.
    async fn is_user_active(&self, username: &str) -> Result<bool, SourceError>;
}

/// A user as served by the enrollment API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub uid: u64,
    /// Course enrollments, e.g. `MUS206_WI23_D00`
    #[serde(default)]
    pub enrollments: Vec<String>,
}

impl UserRecord {
    /// A user counts as enrolled while at least one enrollment remains.
    pub fn is_enrolled(&self) -> bool {
        !self.enrollments.is_empty()
    }
}
