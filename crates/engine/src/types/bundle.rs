//! Bundle and entry types.
//!
//! A [`Bundle`] is an ordered sequence of pending operations with either
//! `transaction` (atomic) or `batch` (independent) semantics. Each
//! [`BundleEntry`] carries its request line, an optional payload, an
//! optional `fullUrl` used for intra-bundle references, and conditional
//! headers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::outcome::Outcome;
use crate::types::StoredResource;

/// Atomicity policy of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleType {
    /// All entries succeed or none do.
    Transaction,
    /// Entries are independent; each gets its own outcome.
    Batch,
}

/// HTTP method of a bundle entry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Update (or conditional update).
    Put,
    /// Delete, conditional delete, or expunge.
    Delete,
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Get => write!(f, "GET"),
            RequestMethod::Post => write!(f, "POST"),
            RequestMethod::Put => write!(f, "PUT"),
            RequestMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// One pending operation inside a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Temporary (URN form) or canonical identity of the entry's resource,
    /// referenced by sibling entries.
    pub full_url: Option<String>,
    /// The request method.
    pub method: RequestMethod,
    /// The request URL: `Type`, `Type/id`, `Type?query`, or
    /// `Type/id/$expunge`.
    pub url: String,
    /// The resource payload, for POST and PUT.
    pub resource: Option<Value>,
    /// `If-None-Exist` search criteria for conditional create.
    pub if_none_exist: Option<String>,
    /// `If-Match` version precondition for update.
    pub if_match: Option<String>,
}

impl BundleEntry {
    /// Creates an entry with just a request line.
    pub fn new(method: RequestMethod, url: impl Into<String>) -> Self {
        Self {
            full_url: None,
            method,
            url: url.into(),
            resource: None,
            if_none_exist: None,
            if_match: None,
        }
    }

    /// Attaches a resource payload.
    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Attaches a temporary or canonical fullUrl.
    pub fn with_full_url(mut self, full_url: impl Into<String>) -> Self {
        self.full_url = Some(full_url.into());
        self
    }

    /// Attaches `If-None-Exist` criteria.
    pub fn with_if_none_exist(mut self, criteria: impl Into<String>) -> Self {
        self.if_none_exist = Some(criteria.into());
        self
    }

    /// Attaches an `If-Match` precondition.
    pub fn with_if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }
}

/// An ordered sequence of pending operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Atomicity policy.
    pub bundle_type: BundleType,
    /// The entries, in client order.
    pub entries: Vec<BundleEntry>,
}

impl Bundle {
    /// Creates an empty transaction bundle.
    pub fn transaction() -> Self {
        Self {
            bundle_type: BundleType::Transaction,
            entries: Vec::new(),
        }
    }

    /// Creates an empty batch bundle.
    pub fn batch() -> Self {
        Self {
            bundle_type: BundleType::Batch,
            entries: Vec::new(),
        }
    }

    /// Appends an entry.
    pub fn with_entry(mut self, entry: BundleEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

/// Result of one executed entry: a success payload or an error outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResult {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// Location of a created resource.
    pub location: Option<String>,
    /// ETag of the resulting version.
    pub etag: Option<String>,
    /// Last-modified timestamp of the resulting version.
    pub last_modified: Option<String>,
    /// The resulting resource content, for reads, creates, and updates.
    pub resource: Option<Value>,
    /// The error outcome, for failed entries.
    pub outcome: Option<Outcome>,
}

impl EntryResult {
    /// Successful create.
    pub fn created(resource: &StoredResource, location: String) -> Self {
        Self {
            status: 201,
            location: Some(location),
            etag: Some(resource.etag()),
            last_modified: Some(resource.last_modified().to_rfc3339()),
            resource: Some(resource.content().clone()),
            outcome: None,
        }
    }

    /// Successful read or update.
    pub fn ok(resource: &StoredResource) -> Self {
        Self {
            status: 200,
            location: None,
            etag: Some(resource.etag()),
            last_modified: Some(resource.last_modified().to_rfc3339()),
            resource: Some(resource.content().clone()),
            outcome: None,
        }
    }

    /// Successful delete or expunge.
    pub fn deleted() -> Self {
        Self {
            status: 204,
            location: None,
            etag: None,
            last_modified: None,
            resource: None,
            outcome: None,
        }
    }

    /// Failed entry.
    pub fn error(outcome: Outcome) -> Self {
        Self {
            status: outcome.status,
            location: None,
            etag: None,
            last_modified: None,
            resource: None,
            outcome: Some(outcome),
        }
    }

    /// Returns `true` if the entry succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Result of executing a whole bundle, entry results in original order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleResult {
    /// The executed bundle's atomicity policy.
    pub bundle_type: BundleType,
    /// One result per entry, in the order the entries were submitted.
    pub entries: Vec<EntryResult>,
}
