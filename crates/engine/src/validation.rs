//! Validation collaborator interface.
//!
//! Schema/profile validation is performed by an external collaborator; the
//! engine only consumes its issue list. A [`NoopValidator`] is provided for
//! deployments that validate upstream.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Severity of a single validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// The resource does not conform; the operation must not proceed.
    Error,
    /// The resource conforms with concerns.
    Warning,
    /// Informational finding.
    Information,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSeverity::Error => write!(f, "error"),
            IssueSeverity::Warning => write!(f, "warning"),
            IssueSeverity::Information => write!(f, "information"),
        }
    }
}

/// A single finding reported by the validation collaborator.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the finding.
    pub severity: IssueSeverity,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an error-severity issue.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    /// Creates a warning-severity issue.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

/// Raised when validation reports at least one error-severity issue.
#[derive(Error, Debug)]
#[error("resource validation failed with {} issue(s)", issues.len())]
pub struct ValidationFailure {
    /// All issues reported for the resource, warnings included.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationFailure {
    /// Joins all issue messages for diagnostics output.
    pub fn diagnostics(&self) -> String {
        self.issues
            .iter()
            .map(|i| format!("{}: {}", i.severity, i.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation collaborator contract.
///
/// Implementations check a resource against its schema and an optional
/// profile and return every finding; the engine fails the operation if any
/// finding has [`IssueSeverity::Error`].
#[async_trait]
pub trait ResourceValidator: Send + Sync {
    /// Validates `content` as an instance of `resource_type`.
    async fn validate(
        &self,
        resource_type: &str,
        content: &Value,
        profile: Option<&str>,
    ) -> Vec<ValidationIssue>;
}

/// Validator that accepts every resource.
#[derive(Debug, Default)]
pub struct NoopValidator;

#[async_trait]
impl ResourceValidator for NoopValidator {
    async fn validate(
        &self,
        _resource_type: &str,
        _content: &Value,
        _profile: Option<&str>,
    ) -> Vec<ValidationIssue> {
        Vec::new()
    }
}
