//! Persistence collaborator traits.
//!
//! The engine never talks to a database directly; it consumes these traits.
//! A transaction bundle performs every storage call of every command on one
//! [`StoreTransaction`] handle, so entries processed earlier in the same
//! bundle are visible to later ones (read-your-own-writes). A batch bundle
//! opens one handle per entry.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;
use crate::search::{SearchPage, SearchQuery};
use crate::types::StoredResource;

/// Entry point to the persistence collaborator.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Returns a human-readable name for this store.
    fn name(&self) -> &'static str;

    /// Begins a transaction. The handle must be committed or rolled back;
    /// dropping it without either must behave as a rollback.
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>>;
}

/// An active storage transaction.
///
/// All reads within the handle see uncommitted writes made through the same
/// handle. The handle is exclusively owned by one bundle's command list for
/// its duration.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Creates a resource with a server-assigned id, at version 1.
    async fn create(
        &mut self,
        resource_type: &str,
        content: Value,
    ) -> StorageResult<StoredResource>;

    /// Creates a resource with a client-supplied id, at version 1.
    ///
    /// Used for update-as-create (`PUT` to a non-existent id).
    async fn create_with_id(
        &mut self,
        resource_type: &str,
        id: &str,
        content: Value,
    ) -> StorageResult<StoredResource>;

    /// Reads the latest version of a resource, deleted versions included;
    /// callers inspect [`StoredResource::is_deleted`].
    async fn read(
        &mut self,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<StoredResource>>;

    /// Reads a specific version of a resource.
    async fn read_version(
        &mut self,
        resource_type: &str,
        id: &str,
        version_id: u64,
    ) -> StorageResult<Option<StoredResource>>;

    /// Writes a new version of `current` with the given content.
    ///
    /// # Errors
    ///
    /// * `StorageError::VersionConflict` - if `current` is no longer the
    ///   latest version (a concurrent writer won)
    async fn update(
        &mut self,
        current: &StoredResource,
        content: Value,
    ) -> StorageResult<StoredResource>;

    /// Soft-deletes a resource, writing a new deleted version.
    async fn delete(&mut self, resource_type: &str, id: &str) -> StorageResult<StoredResource>;

    /// Permanently removes a resource and its whole history.
    async fn expunge(&mut self, resource_type: &str, id: &str) -> StorageResult<()>;

    /// Evaluates a search query, returning one page plus the overall match
    /// count. Soft-deleted resources never match.
    async fn search(&mut self, query: &SearchQuery) -> StorageResult<SearchPage>;

    /// Commits the transaction, persisting all changes.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls back the transaction, discarding all changes.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;

    /// Returns whether this transaction is still usable.
    fn is_active(&self) -> bool;
}
