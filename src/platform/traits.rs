//! Core traits for content platforms.
//!
//! This module defines the `ContentPlatform` trait, the only surface the
//! race needs from the outside world: create, edit and delete posts, and
//! read the stream of newest posts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::PostId;

/// Error types for platform operations.
///
/// Every variant is a transport failure from the point of view of the race:
/// the caller never retries it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// Connection, timeout or TLS failure
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials rejected or token could not be obtained
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Rate limited by the platform
    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Request reached the platform but was refused
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Where posts are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// A named community (`r/<name>`)
    Community(String),
    /// A user's own profile feed (`u/<name>`)
    UserProfile(String),
}

impl Location {
    /// Name as the API expects it in the `sr` field and listing paths.
    pub fn api_name(&self) -> String {
        match self {
            Location::Community(name) => name.clone(),
            Location::UserProfile(user) => format!("u_{}", user),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Community(name) => write!(f, "r/{}", name),
            Location::UserProfile(user) => write!(f, "u/{}", user),
        }
    }
}

/// A post as returned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Identifier the platform assigned
    pub id: PostId,
    /// Fully qualified name (`t3_<id>`) used by edit/delete calls
    pub fullname: String,
    /// Creation time reported by the platform, if any
    pub created_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Build an item for a freshly assigned identifier.
    pub fn new(id: PostId) -> Self {
        Self {
            id,
            fullname: format!("t3_{}", id),
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn ordinal(&self) -> u64 {
        self.id.ordinal()
    }
}

/// Core trait for content platforms.
///
/// Implementations are shared between tasks, so calls take `&self`.
#[async_trait]
pub trait ContentPlatform: Send + Sync {
    /// Identifier of the credentials behind this client (for logs).
    fn id(&self) -> &str;

    /// Create a text post and return it with its assigned identifier.
    async fn create_item(
        &self,
        location: &Location,
        title: &str,
        body: &str,
    ) -> Result<Item, PlatformError>;

    /// Delete a post created by this client.
    async fn delete_item(&self, item: &Item) -> Result<(), PlatformError>;

    /// Replace the body of a post created by this client.
    async fn edit_item(&self, item: &Item, body: &str) -> Result<(), PlatformError>;

    /// Newest posts in `location`, most recent first.
    async fn list_recent(
        &self,
        location: &Location,
        limit: usize,
    ) -> Result<Vec<Item>, PlatformError>;
}
