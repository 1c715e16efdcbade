//! Bundle commands.
//!
//! Each bundle entry is parsed into a [`Command`]: the operation derived
//! from the request method and URL shape, plus the payload and conditional
//! headers. Commands execute in fixed phases (delete, create, update, read)
//! rather than entry order, so a transaction can delete an old resource and
//! create its replacement in one bundle regardless of how the client ordered
//! the entries.

mod factory;
mod list;

pub use factory::CommandFactory;
pub use list::CommandList;

use serde_json::Value;

use crate::error::BundleError;
use crate::types::{parse_if_match, BundleEntry, RequestMethod};

/// The operation a command performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// `POST Type`, optionally conditional via `If-None-Exist`.
    Create {
        /// Target resource type.
        resource_type: String,
        /// Raw `If-None-Exist` search criteria.
        if_none_exist: Option<String>,
    },
    /// `PUT Type/id`.
    Update {
        /// Target resource type.
        resource_type: String,
        /// Target logical id.
        id: String,
        /// Version precondition from `If-Match`.
        expected_version: Option<u64>,
    },
    /// `PUT Type?query`.
    ConditionalUpdate {
        /// Target resource type.
        resource_type: String,
        /// Raw selection criteria after `?`.
        query: String,
        /// Version precondition from `If-Match`.
        expected_version: Option<u64>,
    },
    /// `DELETE Type/id`.
    Delete {
        /// Target resource type.
        resource_type: String,
        /// Target logical id.
        id: String,
    },
    /// `DELETE Type?query`.
    ConditionalDelete {
        /// Target resource type.
        resource_type: String,
        /// Raw selection criteria after `?`.
        query: String,
    },
    /// `DELETE Type/id/$expunge`: permanent removal of a soft-deleted
    /// resource.
    Expunge {
        /// Target resource type.
        resource_type: String,
        /// Target logical id.
        id: String,
    },
    /// `GET Type/id`.
    Read {
        /// Target resource type.
        resource_type: String,
        /// Target logical id.
        id: String,
    },
}

/// Execution phase of a command. Phases run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Deletes, conditional deletes, and expunges.
    Delete,
    /// Creates, ordered so producers of temporary ids run first.
    Create,
    /// Updates and conditional updates.
    Update,
    /// Reads.
    Read,
}

impl CommandKind {
    /// The phase this command executes in.
    pub fn phase(&self) -> Phase {
        match self {
            CommandKind::Delete { .. }
            | CommandKind::ConditionalDelete { .. }
            | CommandKind::Expunge { .. } => Phase::Delete,
            CommandKind::Create { .. } => Phase::Create,
            CommandKind::Update { .. } | CommandKind::ConditionalUpdate { .. } => Phase::Update,
            CommandKind::Read { .. } => Phase::Read,
        }
    }

    /// The target resource type.
    pub fn resource_type(&self) -> &str {
        match self {
            CommandKind::Create { resource_type, .. }
            | CommandKind::Update { resource_type, .. }
            | CommandKind::ConditionalUpdate { resource_type, .. }
            | CommandKind::Delete { resource_type, .. }
            | CommandKind::ConditionalDelete { resource_type, .. }
            | CommandKind::Expunge { resource_type, .. }
            | CommandKind::Read { resource_type, .. } => resource_type,
        }
    }

    /// Short verb name for logging and denial messages.
    pub fn verb(&self) -> &'static str {
        match self {
            CommandKind::Create { .. } => "create",
            CommandKind::Update { .. } | CommandKind::ConditionalUpdate { .. } => "update",
            CommandKind::Delete { .. } | CommandKind::ConditionalDelete { .. } => "delete",
            CommandKind::Expunge { .. } => "expunge",
            CommandKind::Read { .. } => "read",
        }
    }
}

/// One parsed bundle entry.
#[derive(Debug, Clone)]
pub struct Command {
    /// Position of the source entry in the bundle; results are reported in
    /// this order.
    pub index: usize,
    /// The parsed operation.
    pub kind: CommandKind,
    /// The entry's fullUrl, if any.
    pub full_url: Option<String>,
    /// The payload, for creates and updates.
    pub resource: Option<Value>,
    /// Indices of sibling commands whose temporary ids this command's
    /// payload references. Filled in by [`CommandList`].
    pub dependencies: Vec<usize>,
}

impl Command {
    /// Parses a bundle entry at `index` into a command.
    ///
    /// # Errors
    ///
    /// * `BundleError::InvalidEntry` - if the method and URL shape do not
    ///   form a supported operation, a required payload is missing, or the
    ///   payload contradicts the request line
    pub fn parse(index: usize, entry: &BundleEntry) -> Result<Self, BundleError> {
        let invalid = |message: &str| BundleError::InvalidEntry {
            index,
            message: message.to_string(),
        };

        let expected_version = match entry.if_match.as_deref() {
            Some(raw) => Some(
                parse_if_match(raw).ok_or_else(|| invalid("If-Match is not a weak ETag"))?,
            ),
            None => None,
        };

        let kind = if let Some((head, query)) = entry.url.split_once('?') {
            if query.is_empty() || !is_type_segment(head) {
                return Err(invalid("conditional URL must be Type?query"));
            }
            match entry.method {
                RequestMethod::Put => CommandKind::ConditionalUpdate {
                    resource_type: head.to_string(),
                    query: query.to_string(),
                    expected_version,
                },
                RequestMethod::Delete => CommandKind::ConditionalDelete {
                    resource_type: head.to_string(),
                    query: query.to_string(),
                },
                _ => return Err(invalid("conditional URL requires PUT or DELETE")),
            }
        } else {
            let segments: Vec<&str> = entry.url.trim_matches('/').split('/').collect();
            match (entry.method, segments.as_slice()) {
                (RequestMethod::Post, [resource_type]) if is_type_segment(resource_type) => {
                    CommandKind::Create {
                        resource_type: resource_type.to_string(),
                        if_none_exist: entry.if_none_exist.clone(),
                    }
                }
                (RequestMethod::Put, [resource_type, id])
                    if is_type_segment(resource_type) && is_id_segment(id) =>
                {
                    CommandKind::Update {
                        resource_type: resource_type.to_string(),
                        id: id.to_string(),
                        expected_version,
                    }
                }
                (RequestMethod::Delete, [resource_type, id, "$expunge"])
                    if is_type_segment(resource_type) && is_id_segment(id) =>
                {
                    CommandKind::Expunge {
                        resource_type: resource_type.to_string(),
                        id: id.to_string(),
                    }
                }
                (RequestMethod::Delete, [resource_type, id])
                    if is_type_segment(resource_type) && is_id_segment(id) =>
                {
                    CommandKind::Delete {
                        resource_type: resource_type.to_string(),
                        id: id.to_string(),
                    }
                }
                (RequestMethod::Get, [resource_type, id])
                    if is_type_segment(resource_type) && is_id_segment(id) =>
                {
                    CommandKind::Read {
                        resource_type: resource_type.to_string(),
                        id: id.to_string(),
                    }
                }
                _ => return Err(invalid("unsupported method and URL combination")),
            }
        };

        let resource = match &kind {
            CommandKind::Create { resource_type, .. }
            | CommandKind::Update { resource_type, .. }
            | CommandKind::ConditionalUpdate { resource_type, .. } => {
                let payload = entry
                    .resource
                    .as_ref()
                    .ok_or_else(|| invalid("entry requires a resource payload"))?;
                let payload_type = payload.get("resourceType").and_then(Value::as_str);
                if payload_type != Some(resource_type.as_str()) {
                    return Err(invalid("payload resourceType does not match the URL"));
                }
                if let CommandKind::Update { id, .. } = &kind {
                    let payload_id = payload.get("id").and_then(Value::as_str);
                    if payload_id.is_some_and(|p| p != id) {
                        return Err(invalid("payload id does not match the URL"));
                    }
                }
                Some(payload.clone())
            }
            _ => {
                if entry.resource.is_some() {
                    return Err(invalid("entry must not carry a resource payload"));
                }
                None
            }
        };

        Ok(Self {
            index,
            kind,
            full_url: entry.full_url.clone(),
            resource,
            dependencies: Vec::new(),
        })
    }

    /// Returns the entry's fullUrl when it is a temporary (URN form) id.
    pub fn temporary_id(&self) -> Option<&str> {
        self.full_url
            .as_deref()
            .filter(|u| u.starts_with("urn:uuid:") || u.starts_with("urn:oid:"))
    }
}

fn is_type_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_id_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}
