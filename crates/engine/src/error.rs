//! Error types for the bundle execution engine.
//!
//! Errors are grouped by concern and aggregated into [`EngineError`]. The
//! taxonomy deliberately separates deterministic user-input errors (never
//! retried) from transient storage faults (the caller may retry the whole
//! bundle).

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::validation::ValidationFailure;

/// The primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Authorization denials
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Reference classification and resolution errors
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// Search parameter errors
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Storage collaborator errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Bundle shape and conditional-operation errors
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// Profile conformance failures
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
}

/// Authorization denials.
///
/// The denial reason is logged where the decision is made; the error itself
/// carries only the operation and resource type so that outward diagnostics
/// do not leak policy internals to remote callers.
#[derive(Error, Debug)]
pub enum AuthError {
    /// An authorization rule refused the operation.
    #[error("{operation} of {resource_type} denied")]
    Denied {
        operation: String,
        resource_type: String,
    },

    /// No authorization rule is registered for the resource type.
    #[error("no authorization rule for resource type {resource_type}")]
    UnknownResourceType { resource_type: String },
}

/// Errors raised while classifying or resolving references.
#[derive(Error, Debug)]
pub enum ReferenceError {
    /// The reference target is missing, deleted, or not readable by the
    /// current user. All three cases surface identically so an unauthorized
    /// caller cannot probe for resource existence via reference fields.
    #[error("reference target not accessible: {reference}")]
    TargetNotAccessible { reference: String },

    /// A conditional reference matched no resource.
    #[error("conditional reference matched no resource: {reference}")]
    NoMatch { reference: String },

    /// A conditional reference matched more than one resource.
    #[error("conditional reference matched {count} resources: {reference}")]
    MultipleMatches { reference: String, count: usize },

    /// The reference string does not parse as any supported kind.
    #[error("malformed reference: {reference}")]
    Malformed { reference: String },

    /// A temporary (URN) reference does not name any entry of the bundle.
    #[error("temporary reference does not match any bundle entry: {reference}")]
    UnknownTemporary { reference: String },
}

/// Errors raised while binding search parameters.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Supplied parameter names with no definition for the resource type.
    #[error("unsupported search parameters for {resource_type}: {}", parameters.join(", "))]
    UnsupportedParameters {
        resource_type: String,
        parameters: Vec<String>,
    },

    /// The resource type has no search parameter catalog.
    #[error("unsupported resource type: {resource_type}")]
    UnsupportedResourceType { resource_type: String },

    /// A parameter value does not parse for its parameter type.
    #[error("invalid value '{value}' for search parameter {parameter}")]
    InvalidValue { parameter: String, value: String },
}

/// Errors surfaced by the persistence collaborator.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested resource was not found.
    #[error("resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// The resource exists but has been soft-deleted.
    #[error("resource deleted: {resource_type}/{id}")]
    Gone { resource_type: String, id: String },

    /// Optimistic version check failed; a concurrent writer won.
    #[error("version conflict on {resource_type}/{id}: expected {expected}, found {actual}")]
    VersionConflict {
        resource_type: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// The transaction handle was already committed or rolled back.
    #[error("transaction no longer valid")]
    InvalidTransaction,

    /// Transient or fatal I/O failure. Always fatal to the current bundle;
    /// the caller may retry the whole bundle.
    #[error("storage failure: {message}")]
    Failure { message: String },
}

impl StorageError {
    /// Returns `true` if this error is a transient fault rather than a
    /// deterministic result of the request state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Failure { .. } | StorageError::InvalidTransaction
        )
    }
}

/// Errors in the shape or conditional semantics of a bundle.
#[derive(Error, Debug)]
pub enum BundleError {
    /// Two entries share the same URN-form fullUrl.
    #[error("duplicate fullUrl in bundle: {full_url}")]
    DuplicateFullUrl { full_url: String },

    /// An entry's request line or payload is unusable.
    #[error("invalid bundle entry {index}: {message}")]
    InvalidEntry { index: usize, message: String },

    /// A conditional operation matched no resource.
    #[error("conditional {operation} matched no resource")]
    NoMatch { operation: String },

    /// A conditional operation matched more than one resource.
    #[error("conditional {operation} matched {count} resources, expected at most 1")]
    MultipleMatches { operation: String, count: usize },

    /// Temporary references between entries form a cycle.
    #[error("temporary reference cycle involving entry {index}")]
    ReferenceCycle { index: usize },

    /// Batch entries must be independent; a temporary reference between
    /// entries is only allowed in a transaction bundle.
    #[error("entry {index} holds a temporary reference, not allowed in a batch bundle")]
    TemporaryReferenceInBatch { index: usize },

    /// Expunge targets a resource that was never soft-deleted.
    #[error("expunge of {resource_type}/{id} requires the resource to be deleted first")]
    ExpungeNotDeleted { resource_type: String, id: String },
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for storage collaborator calls.
pub type StorageResult<T> = Result<T, StorageError>;

impl EngineError {
    /// Returns `true` if the error is a transient storage fault rather than
    /// a deterministic consequence of the request. Deterministic errors are
    /// captured per-entry in a batch bundle; transient faults abort the
    /// whole bundle.
    pub fn is_fatal_to_bundle(&self) -> bool {
        match self {
            EngineError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}
