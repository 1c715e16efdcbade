//! Stored resource types.
//!
//! [`StoredResource`] wraps a resource (carried as JSON) with the
//! persistence metadata the engine needs: identity, numeric version,
//! timestamps, and the soft-delete marker. The engine treats the content as
//! an immutable value; every rewrite produces a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// The finalized identity of a persisted resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The resource type (e.g., "Organization").
    pub resource_type: String,
    /// The logical id.
    pub id: String,
    /// The version number.
    pub version_id: u64,
}

impl Identity {
    /// Returns the relative form, `Type/id`.
    pub fn relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Returns the absolute, versioned form under `base`.
    pub fn absolute_versioned(&self, base: &Url) -> String {
        let path = format!(
            "{}/{}/_history/{}",
            self.resource_type, self.id, self.version_id
        );
        base.join(&path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", base, path))
    }
}

/// A resource with persistence metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResource {
    resource_type: String,
    id: String,
    version_id: u64,
    content: Value,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl StoredResource {
    /// Creates the first version of a resource.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>, content: Value) -> Self {
        let now = Utc::now();
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id: 1,
            content,
            created_at: now,
            last_modified: now,
            deleted_at: None,
        }
    }

    /// Recreates a stored resource from persisted fields.
    pub fn from_storage(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        version_id: u64,
        content: Value,
        created_at: DateTime<Utc>,
        last_modified: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id,
            content,
            created_at,
            last_modified,
            deleted_at,
        }
    }

    /// Returns the resource type.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the logical id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version number.
    pub fn version_id(&self) -> u64 {
        self.version_id
    }

    /// Returns the resource content.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Consumes self and returns the content.
    pub fn into_content(self) -> Value {
        self.content
    }

    /// Returns when the resource was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the resource was last modified.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Returns `true` if the resource has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns when the resource was soft-deleted, if it was.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns the weak ETag for this version.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version_id)
    }

    /// Returns the finalized identity of this version.
    pub fn identity(&self) -> Identity {
        Identity {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
            version_id: self.version_id,
        }
    }

    /// Returns the relative URL path, `Type/id`.
    pub fn url(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Returns the absolute, versioned URL under `base`.
    pub fn absolute_versioned_url(&self, base: &Url) -> String {
        self.identity().absolute_versioned(base)
    }

    /// Creates the next version with new content.
    pub fn new_version(self, content: Value) -> Self {
        Self {
            version_id: self.version_id + 1,
            content,
            last_modified: Utc::now(),
            deleted_at: None,
            ..self
        }
    }

    /// Creates the next version, marked deleted.
    pub fn mark_deleted(self) -> Self {
        let now = Utc::now();
        Self {
            version_id: self.version_id + 1,
            last_modified: now,
            deleted_at: Some(now),
            ..self
        }
    }
}

/// Parses a version number out of an `If-Match` value.
///
/// Accepts `W/"2"`, `"2"`, and bare `2`.
pub(crate) fn parse_if_match(value: &str) -> Option<u64> {
    value
        .trim_start_matches("W/")
        .trim_matches('"')
        .parse()
        .ok()
}
