//! Read-access tags.
//!
//! A resource's `meta.tag` carries zero or more read-access tags that govern
//! which users may read or reference it, independent of write authorization.
//! Three scopes exist: local-only, organization-restricted, and all.

use serde_json::{json, Value};
use thiserror::Error;

use crate::user::User;

/// Code system of the read-access tags.
pub const READ_ACCESS_TAG_SYSTEM: &str =
    "https://helios-software.com/fhir/CodeSystem/read-access-tag";

/// Extension carrying the organization identifier of an
/// organization-restricted tag.
pub const ORGANIZATION_EXTENSION_URL: &str =
    "https://helios-software.com/fhir/StructureDefinition/read-access-organization";

const CODE_LOCAL: &str = "LOCAL";
const CODE_ORGANIZATION: &str = "ORGANIZATION";
const CODE_ALL: &str = "ALL";

/// One read-access tag attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadAccess {
    /// Readable by local users only.
    Local,
    /// Readable by users of the named organization.
    Organization(String),
    /// Readable by everyone.
    All,
}

/// Raised when a resource's read-access tag set is not well-formed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TagError {
    /// No read-access tag present.
    #[error("resource carries no read access tag")]
    Missing,

    /// A tag in the read-access system has an unknown code.
    #[error("unknown read access tag code: {code}")]
    UnknownCode { code: String },

    /// An ORGANIZATION tag without the organization extension.
    #[error("organization read access tag is missing its organization identifier")]
    MissingOrganization,
}

impl ReadAccess {
    /// Returns `true` if this tag's scope covers the given user.
    pub fn covers(&self, user: &User) -> bool {
        match self {
            ReadAccess::All => true,
            ReadAccess::Local => user.is_local(),
            ReadAccess::Organization(identifier) => user.organization() == identifier,
        }
    }

    /// Parses the read-access tag set from a resource's content.
    ///
    /// The tag set must be non-empty and contain no malformed entries;
    /// tags outside [`READ_ACCESS_TAG_SYSTEM`] are ignored.
    pub fn from_content(content: &Value) -> Result<Vec<ReadAccess>, TagError> {
        let tags = content
            .pointer("/meta/tag")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut parsed = Vec::new();
        for tag in tags {
            if tag.get("system").and_then(Value::as_str) != Some(READ_ACCESS_TAG_SYSTEM) {
                continue;
            }
            let code = tag.get("code").and_then(Value::as_str).unwrap_or_default();
            match code {
                CODE_LOCAL => parsed.push(ReadAccess::Local),
                CODE_ALL => parsed.push(ReadAccess::All),
                CODE_ORGANIZATION => {
                    let identifier = tag
                        .get("extension")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .find(|e| {
                            e.get("url").and_then(Value::as_str)
                                == Some(ORGANIZATION_EXTENSION_URL)
                        })
                        .and_then(|e| e.get("valueString"))
                        .and_then(Value::as_str)
                        .ok_or(TagError::MissingOrganization)?;
                    parsed.push(ReadAccess::Organization(identifier.to_string()));
                }
                other => {
                    return Err(TagError::UnknownCode {
                        code: other.to_string(),
                    });
                }
            }
        }

        if parsed.is_empty() {
            Err(TagError::Missing)
        } else {
            Ok(parsed)
        }
    }

    /// Returns `true` if any tag of the set covers the user.
    pub fn any_covers(tags: &[ReadAccess], user: &User) -> bool {
        tags.iter().any(|t| t.covers(user))
    }

    /// Renders this tag as a `meta.tag` JSON entry.
    pub fn tag_value(&self) -> Value {
        match self {
            ReadAccess::Local => json!({
                "system": READ_ACCESS_TAG_SYSTEM,
                "code": CODE_LOCAL,
            }),
            ReadAccess::All => json!({
                "system": READ_ACCESS_TAG_SYSTEM,
                "code": CODE_ALL,
            }),
            ReadAccess::Organization(identifier) => json!({
                "system": READ_ACCESS_TAG_SYSTEM,
                "code": CODE_ORGANIZATION,
                "extension": [{
                    "url": ORGANIZATION_EXTENSION_URL,
                    "valueString": identifier,
                }],
            }),
        }
    }
}
