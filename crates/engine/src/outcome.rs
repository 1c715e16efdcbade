//! Structured outcomes returned to the transport layer.
//!
//! Every failure maps to one [`Outcome`] carrying the error kind, an
//! HTTP-equivalent status code, and human-readable diagnostics. Outward
//! diagnostics for authorization and reference failures are deliberately
//! generic; the detailed reason stays in the server log.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, BundleError, EngineError, ReferenceError, SearchError, StorageError};

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    /// An authorization rule refused the operation.
    AuthorizationDenied,
    /// An internal literal reference target is missing or unauthorized.
    /// Surfaced identically to [`OutcomeKind::AuthorizationDenied`] on the
    /// wire; kept distinct for server-side accounting.
    ReferenceUnresolved,
    /// A conditional reference or operation matched no resource.
    ConditionalNoMatch,
    /// A conditional reference or operation matched more than one resource.
    ConditionalMultipleMatches,
    /// A supplied search parameter has no definition.
    UnsupportedSearchParameter,
    /// Optimistic version check failed.
    VersionConflict,
    /// Profile conformance failure.
    ValidationFailed,
    /// Transient or fatal storage fault.
    StorageFailure,
    /// The resource addressed by the entry does not exist.
    NotFound,
    /// The resource addressed by the entry has been deleted.
    Gone,
    /// Malformed bundle, malformed reference, or misuse of expunge.
    InvalidRequest,
}

impl OutcomeKind {
    /// HTTP-equivalent status code for this kind.
    pub fn status(&self) -> u16 {
        match self {
            OutcomeKind::AuthorizationDenied | OutcomeKind::ReferenceUnresolved => 403,
            OutcomeKind::ConditionalNoMatch | OutcomeKind::NotFound => 404,
            OutcomeKind::ConditionalMultipleMatches => 412,
            OutcomeKind::UnsupportedSearchParameter | OutcomeKind::InvalidRequest => 400,
            OutcomeKind::VersionConflict => 409,
            OutcomeKind::Gone => 410,
            OutcomeKind::ValidationFailed => 422,
            OutcomeKind::StorageFailure => 500,
        }
    }
}

/// Structured error result for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// The error classification.
    pub kind: OutcomeKind,
    /// HTTP-equivalent status code.
    pub status: u16,
    /// Human-readable diagnostics.
    pub diagnostics: String,
    /// For conditional failures, the match count that caused the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
    /// For search failures, the parameter names with no definition.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unsupported_parameters: Vec<String>,
}

impl Outcome {
    /// Creates an outcome with the kind's default status code.
    pub fn new(kind: OutcomeKind, diagnostics: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.status(),
            diagnostics: diagnostics.into(),
            match_count: None,
            unsupported_parameters: Vec::new(),
        }
    }

    /// Attaches the match count of a failed conditional operation.
    pub fn with_match_count(mut self, count: usize) -> Self {
        self.match_count = Some(count);
        self
    }

    /// Attaches the unsupported parameter names of a failed search.
    pub fn with_unsupported_parameters(mut self, parameters: Vec<String>) -> Self {
        self.unsupported_parameters = parameters;
        self
    }
}

impl From<&EngineError> for Outcome {
    fn from(err: &EngineError) -> Self {
        match err {
            // Denials and unresolved references share one outward shape,
            // hiding whether the target exists from the caller.
            EngineError::Auth(AuthError::Denied { .. })
            | EngineError::Auth(AuthError::UnknownResourceType { .. }) => Outcome::new(
                OutcomeKind::AuthorizationDenied,
                "access to the requested resource is denied",
            ),
            EngineError::Reference(ReferenceError::TargetNotAccessible { .. }) => Outcome::new(
                OutcomeKind::ReferenceUnresolved,
                "access to the requested resource is denied",
            ),
            EngineError::Reference(ReferenceError::NoMatch { reference }) => Outcome::new(
                OutcomeKind::ConditionalNoMatch,
                format!("conditional reference matched no resource: {reference}"),
            )
            .with_match_count(0),
            EngineError::Reference(ReferenceError::MultipleMatches { reference, count }) => {
                Outcome::new(
                    OutcomeKind::ConditionalMultipleMatches,
                    format!("conditional reference matched {count} resources: {reference}"),
                )
                .with_match_count(*count)
            }
            EngineError::Reference(e @ ReferenceError::Malformed { .. })
            | EngineError::Reference(e @ ReferenceError::UnknownTemporary { .. }) => {
                Outcome::new(OutcomeKind::InvalidRequest, e.to_string())
            }
            EngineError::Search(SearchError::UnsupportedParameters { parameters, .. }) => {
                Outcome::new(OutcomeKind::UnsupportedSearchParameter, err.to_string())
                    .with_unsupported_parameters(parameters.clone())
            }
            EngineError::Search(e) => Outcome::new(OutcomeKind::InvalidRequest, e.to_string()),
            EngineError::Storage(e) => Outcome::from(e),
            EngineError::Bundle(e) => Outcome::from(e),
            EngineError::Validation(failure) => {
                Outcome::new(OutcomeKind::ValidationFailed, failure.diagnostics())
            }
        }
    }
}

impl From<&StorageError> for Outcome {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Outcome::new(OutcomeKind::NotFound, err.to_string()),
            StorageError::Gone { .. } => Outcome::new(OutcomeKind::Gone, err.to_string()),
            StorageError::VersionConflict { .. } => {
                Outcome::new(OutcomeKind::VersionConflict, err.to_string())
            }
            StorageError::InvalidTransaction | StorageError::Failure { .. } => {
                Outcome::new(OutcomeKind::StorageFailure, err.to_string())
            }
        }
    }
}

impl From<&BundleError> for Outcome {
    fn from(err: &BundleError) -> Self {
        match err {
            BundleError::NoMatch { .. } => {
                Outcome::new(OutcomeKind::ConditionalNoMatch, err.to_string()).with_match_count(0)
            }
            BundleError::MultipleMatches { count, .. } => {
                Outcome::new(OutcomeKind::ConditionalMultipleMatches, err.to_string())
                    .with_match_count(*count)
            }
            _ => Outcome::new(OutcomeKind::InvalidRequest, err.to_string()),
        }
    }
}
